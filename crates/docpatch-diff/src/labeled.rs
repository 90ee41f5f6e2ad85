//! Labeled diff tree.
//!
//! The counted diff is reshaped into a nested value mirroring the documents,
//! where every changed leaf carries its dominant label (`"added"`,
//! `"removed"` or `"updated"`). Arrays are compacted: only changed positions
//! appear, in index order.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use docpatch_types::{Document, Path, Segment};

use crate::counted::{changes, ChangeKind, DiffCounts, DiffOptions};

#[derive(Debug)]
enum Node {
    Leaf(ChangeKind),
    Object(BTreeMap<String, Node>),
    Array(BTreeMap<usize, Node>),
}

impl Node {
    fn container_for(segment: &Segment) -> Self {
        match segment {
            Segment::Key(_) => Node::Object(BTreeMap::new()),
            Segment::Index(_) | Segment::Wildcard => Node::Array(BTreeMap::new()),
        }
    }

    fn is_container(&self) -> bool {
        !matches!(self, Node::Leaf(_))
    }

    /// Descend into the child addressed by `segment`, creating it (or
    /// replacing a mismatched node) as needed.
    fn child_mut(&mut self, segment: &Segment, next: Option<&Segment>) -> &mut Node {
        let fresh = || match next {
            Some(next) => Node::container_for(next),
            None => Node::Object(BTreeMap::new()),
        };
        let matches_shape = matches!(
            (&*self, segment),
            (Node::Object(_), Segment::Key(_)) | (Node::Array(_), Segment::Index(_) | Segment::Wildcard)
        );
        if !matches_shape {
            *self = Node::container_for(segment);
        }
        match (self, segment) {
            (Node::Object(children), Segment::Key(key)) => children.entry(key.clone()).or_insert_with(fresh),
            (Node::Array(children), Segment::Index(index)) => children.entry(*index).or_insert_with(fresh),
            // A collapsed index stands for the whole array; one element represents it.
            (Node::Array(children), Segment::Wildcard) => children.entry(0).or_insert_with(fresh),
            _ => unreachable!("node reshaped to match segment"),
        }
    }

    fn insert(&mut self, segments: &[Segment], kind: ChangeKind) {
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        let child = self.child_mut(head, rest.first());
        if rest.is_empty() {
            // A container reached through another path wins over a leaf label.
            if !child.is_container() || child.is_empty_container() {
                *child = Node::Leaf(kind);
            }
        } else {
            if !child.is_container() {
                *child = Node::container_for(&rest[0]);
            }
            child.insert(rest, kind);
        }
    }

    fn is_empty_container(&self) -> bool {
        match self {
            Node::Leaf(_) => false,
            Node::Object(children) => children.is_empty(),
            Node::Array(children) => children.is_empty(),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Node::Leaf(kind) => Value::String(kind.as_str().to_string()),
            Node::Object(children) => Value::Object(
                children
                    .into_iter()
                    .map(|(key, node)| (key, node.into_value()))
                    .collect::<Map<String, Value>>(),
            ),
            Node::Array(children) => Value::Array(children.into_values().map(Node::into_value).collect()),
        }
    }
}

/// Labeled nested diff between `a` and `b`.
///
/// Each changed path gets a single label chosen with `added > removed >
/// updated` precedence, which only matters when grouping folds several
/// changes into one path.
pub fn deep(a: &Document, b: &Document, options: DiffOptions) -> Value {
    let mut buckets: BTreeMap<Path, DiffCounts> = BTreeMap::new();
    for (path, kind) in changes(a, b) {
        buckets.entry(options.bucket(&path)).or_default().record(kind);
    }

    let mut root = Node::Object(BTreeMap::new());
    for (path, counts) in buckets {
        if let Some(kind) = counts.dominant() {
            root.insert(path.segments(), kind);
        }
    }
    root.into_value()
}
