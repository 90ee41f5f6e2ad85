use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;

use docpatch_diff::{deep, DiffOptions};
use docpatch_store::{Collection, StoreError};
use docpatch_types::Document;

use crate::error::StreamError;
use crate::progress::ProgressSnapshot;

/// The documents involved in a failed patch, attached to every per-document
/// error.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PatchSnapshot {
    pub before: Document,
    pub after: Option<Document>,
    pub modifier: Option<Document>,
}

/// One document's journey through the pipeline.
///
/// Created by the patch source, mutated by exactly one update strategy,
/// enriched by the progress tracker, then handed to the caller.
#[derive(Clone)]
pub struct Patch {
    /// Generated identifier, distinct from the document's `_id`.
    pub id: String,
    /// The document as read (or as last re-fetched by the document strategy).
    pub before: Document,
    /// Selection criteria for this class of documents.
    pub query: Document,
    /// `None` only when a re-invoked worker declined to modify.
    pub modifier: Option<Document>,
    pub collection: Arc<dyn Collection>,
    pub attempts: u32,
    pub after: Option<Document>,
    /// Labeled diff between `before` and `after`.
    pub diff: Option<Value>,
    pub modified: bool,
    pub skipped: bool,
    pub progress: Option<ProgressSnapshot>,
}

impl Patch {
    /// A fresh patch for `before`, read from `collection` by `query`.
    pub fn new(
        collection: Arc<dyn Collection>,
        query: Document,
        before: Document,
        modifier: Document,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            before,
            query,
            modifier: Some(modifier),
            collection,
            attempts: 1,
            after: None,
            diff: None,
            modified: false,
            skipped: false,
            progress: None,
        }
    }

    /// Record the outcome of applying the patch.
    ///
    /// `None` means the precondition no longer held and nothing was written.
    pub fn annotate(&mut self, after: Option<Document>) {
        match &after {
            Some(updated) => {
                let diff = deep(&self.before, updated, DiffOptions::default());
                self.modified = diff.as_object().is_some_and(|changes| !changes.is_empty());
                self.skipped = false;
                self.diff = Some(diff);
            }
            None => {
                self.modified = false;
                self.skipped = true;
                self.diff = None;
            }
        }
        self.after = after;
    }

    /// The documents of this patch, detached from its collection.
    pub fn snapshot(&self) -> PatchSnapshot {
        PatchSnapshot {
            before: self.before.clone(),
            after: self.after.clone(),
            modifier: self.modifier.clone(),
        }
    }

    /// Wrap a store failure with this patch's documents.
    pub fn store_error(&self, source: StoreError) -> StreamError {
        StreamError::Store {
            source,
            patch: Some(Box::new(self.snapshot())),
        }
    }

    /// Wrap a worker failure with this patch's documents.
    pub fn worker_error(&self, source: anyhow::Error) -> StreamError {
        StreamError::Worker {
            source,
            patch: Box::new(self.snapshot()),
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("id", &self.id)
            .field("collection", &self.collection.name())
            .field("attempts", &self.attempts)
            .field("modified", &self.modified)
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct PatchRecord<'a> {
    id: &'a str,
    collection: &'a str,
    query: &'a Document,
    before: &'a Document,
    after: &'a Option<Document>,
    modifier: &'a Option<Document>,
    diff: &'a Option<Value>,
    modified: bool,
    skipped: bool,
    attempts: u32,
    progress: &'a Option<ProgressSnapshot>,
}

impl Serialize for Patch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PatchRecord {
            id: &self.id,
            collection: self.collection.name(),
            query: &self.query,
            before: &self.before,
            after: &self.after,
            modifier: &self.modifier,
            diff: &self.diff,
            modified: self.modified,
            skipped: self.skipped,
            attempts: self.attempts,
            progress: &self.progress,
        }
        .serialize(serializer)
    }
}
