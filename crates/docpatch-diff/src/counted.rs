//! Counted diff: per-path change counters.
//!
//! Paths present only in the new document are `added`, paths present only
//! in the old document are `removed`, and paths present in both with
//! different leaves are `updated`. A `null` on one side and absence on the
//! other is not a change.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use docpatch_types::{Document, Path};

use crate::flatten::{flatten, has_descendants, is_empty_container, leaves_equal};

/// Classification of a single changed path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Updated,
}

impl ChangeKind {
    /// Label used in labeled diffs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Updated => "updated",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change counters for one path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCounts {
    pub added: u64,
    pub removed: u64,
    pub updated: u64,
}

impl DiffCounts {
    /// Increment the counter for `kind`.
    pub fn record(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Removed => self.removed += 1,
            ChangeKind::Updated => self.updated += 1,
        }
    }

    /// Add another set of counters into this one.
    pub fn merge(&mut self, other: &DiffCounts) {
        self.added += other.added;
        self.removed += other.removed;
        self.updated += other.updated;
    }

    /// Sum of all three counters.
    pub fn total(&self) -> u64 {
        self.added + self.removed + self.updated
    }

    /// The single label for this path: `added` beats `removed` beats `updated`.
    pub fn dominant(&self) -> Option<ChangeKind> {
        if self.added > 0 {
            Some(ChangeKind::Added)
        } else if self.removed > 0 {
            Some(ChangeKind::Removed)
        } else if self.updated > 0 {
            Some(ChangeKind::Updated)
        } else {
            None
        }
    }
}

/// Options controlling how paths are bucketed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Collapse array indices into `[*]` so that changes to different
    /// elements of the same array share one bucket.
    pub group: bool,
}

impl DiffOptions {
    /// Options with array-index grouping enabled.
    pub fn grouped() -> Self {
        Self { group: true }
    }

    pub(crate) fn bucket(&self, path: &Path) -> Path {
        if self.group {
            path.grouped()
        } else {
            path.clone()
        }
    }
}

/// Per-path change counters, keyed by rendered dot path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountedDiff {
    entries: BTreeMap<String, DiffCounts>,
}

impl CountedDiff {
    /// Create an empty counted diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no path changed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct changed paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Counters for a rendered path.
    pub fn get(&self, path: &str) -> Option<&DiffCounts> {
        self.entries.get(path)
    }

    /// Paths and their counters, sorted by path.
    pub fn iter(&self) -> btree_map::Iter<'_, String, DiffCounts> {
        self.entries.iter()
    }

    /// Record one change of `kind` at `path`.
    pub fn record(&mut self, path: impl Into<String>, kind: ChangeKind) {
        self.entries.entry(path.into()).or_default().record(kind);
    }

    /// Fold another counted diff into this one.
    pub fn merge(&mut self, other: &CountedDiff) {
        for (path, counts) in &other.entries {
            self.entries.entry(path.clone()).or_default().merge(counts);
        }
    }
}

impl<'a> IntoIterator for &'a CountedDiff {
    type Item = (&'a String, &'a DiffCounts);
    type IntoIter = btree_map::Iter<'a, String, DiffCounts>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Every changed leaf path between `a` and `b`, in path order.
pub fn changes(a: &Document, b: &Document) -> Vec<(Path, ChangeKind)> {
    let old = flatten(a);
    let new = flatten(b);
    let mut result = Vec::new();

    for (path, old_leaf) in &old {
        match new.get(path) {
            Some(new_leaf) => {
                if !leaves_equal(old_leaf, new_leaf) {
                    result.push((path.clone(), ChangeKind::Updated));
                }
            }
            None => {
                if !is_absent_equivalent(old_leaf, &new, path) {
                    result.push((path.clone(), ChangeKind::Removed));
                }
            }
        }
    }

    for (path, new_leaf) in &new {
        if !old.contains_key(path) && !is_absent_equivalent(new_leaf, &old, path) {
            result.push((path.clone(), ChangeKind::Added));
        }
    }

    result.sort_by(|(x, _), (y, _)| x.cmp(y));
    result
}

/// A one-sided leaf that does not count as a change: `null` against absence,
/// or an empty container whose counterpart is a populated container (the
/// change is carried by the descendant paths instead).
fn is_absent_equivalent(leaf: &Value, other: &BTreeMap<Path, &Value>, path: &Path) -> bool {
    leaf.is_null() || (is_empty_container(leaf) && has_descendants(other, path))
}

/// Count the changes between `a` and `b`.
pub fn diff(a: &Document, b: &Document, options: DiffOptions) -> CountedDiff {
    let mut result = CountedDiff::new();
    diff_into(&mut result, a, b, options);
    result
}

/// Count the changes between `a` and `b` into an existing accumulator.
pub fn diff_into(acc: &mut CountedDiff, a: &Document, b: &Document, options: DiffOptions) {
    for (path, kind) in changes(a, b) {
        acc.record(options.bucket(&path).to_string(), kind);
    }
}
