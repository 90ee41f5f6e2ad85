//! Collection wrapper that simulates concurrent writers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use docpatch_store::{Collection, DocumentCursor, StoreResult};
use docpatch_types::Document;

/// A write performed by "someone else".
#[derive(Clone, Debug)]
pub enum Interference {
    /// `update(query, modifier)` on the wrapped collection.
    Update(Document, Document),
    /// `remove(query)` on the wrapped collection.
    Remove(Document),
}

/// Delegates to an inner collection, running one queued interference
/// immediately before each `find_and_modify`.
pub struct InterferingCollection {
    inner: Arc<dyn Collection>,
    queue: Mutex<VecDeque<Interference>>,
}

impl InterferingCollection {
    /// Wraps `inner` with an empty interference queue.
    pub fn new(inner: Arc<dyn Collection>) -> Self {
        Self {
            inner,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a write to land right after the next read.
    pub fn interfere(&self, interference: Interference) {
        self.queue.lock().expect("lock poisoned").push_back(interference);
    }
}

#[async_trait]
impl Collection for InterferingCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find(&self, query: &Document) -> StoreResult<DocumentCursor> {
        self.inner.find(query).await
    }

    async fn find_one(&self, query: &Document) -> StoreResult<Option<Document>> {
        self.inner.find_one(query).await
    }

    async fn count(&self, query: &Document) -> StoreResult<u64> {
        self.inner.count(query).await
    }

    async fn find_and_modify(
        &self,
        query: &Document,
        modifier: &Document,
    ) -> StoreResult<Option<Document>> {
        let next = self.queue.lock().expect("lock poisoned").pop_front();
        match next {
            Some(Interference::Update(selection, change)) => {
                self.inner.update(&selection, &change).await?;
            }
            Some(Interference::Remove(selection)) => {
                self.inner.remove(&selection).await?;
            }
            None => {}
        }
        self.inner.find_and_modify(query, modifier).await
    }

    async fn insert(&self, document: Document) -> StoreResult<Document> {
        self.inner.insert(document).await
    }

    async fn save(&self, document: Document) -> StoreResult<Document> {
        self.inner.save(document).await
    }

    async fn update(&self, query: &Document, modifier: &Document) -> StoreResult<bool> {
        self.inner.update(query, modifier).await
    }

    async fn remove(&self, query: &Document) -> StoreResult<u64> {
        self.inner.remove(query).await
    }
}
