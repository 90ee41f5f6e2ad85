use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use docpatch_types::Document;

use crate::error::StoreResult;

/// Stream of documents produced by [`Collection::find`].
pub type DocumentCursor = BoxStream<'static, StoreResult<Document>>;

/// A named set of documents keyed by `_id`.
///
/// Implementations must make [`find_and_modify`](Self::find_and_modify)
/// atomic: no other write may interleave between selecting the document and
/// storing the modified version. Everything the patch pipeline guarantees
/// about concurrent writers rests on that.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Documents matching `query`, sorted by `_id` ascending.
    async fn find(&self, query: &Document) -> StoreResult<DocumentCursor>;

    /// First document matching `query` in `_id` order.
    async fn find_one(&self, query: &Document) -> StoreResult<Option<Document>>;

    /// Number of documents matching `query`.
    async fn count(&self, query: &Document) -> StoreResult<u64>;

    /// Atomically apply `modifier` to the first document matching `query`.
    ///
    /// Returns the document as stored after the modification, or `None` if
    /// nothing matched.
    async fn find_and_modify(
        &self,
        query: &Document,
        modifier: &Document,
    ) -> StoreResult<Option<Document>>;

    /// Insert a new document, assigning an `_id` if it has none.
    ///
    /// Returns the stored document.
    async fn insert(&self, document: Document) -> StoreResult<Document>;

    /// Insert or replace a document by `_id`.
    async fn save(&self, document: Document) -> StoreResult<Document>;

    /// Apply `modifier` to the first match. Returns `true` if one matched.
    async fn update(&self, query: &Document, modifier: &Document) -> StoreResult<bool>;

    /// Delete every match. Returns the number deleted.
    async fn remove(&self, query: &Document) -> StoreResult<u64>;
}

/// A named group of collections behind one connection.
#[async_trait]
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// Handle to a collection. The collection need not exist yet; writing
    /// to it creates it.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;

    /// Create an empty collection (no-op if it already exists).
    async fn create_collection(&self, name: &str) -> StoreResult<Arc<dyn Collection>>;

    /// Names of the collections that currently exist, sorted.
    async fn collection_names(&self) -> StoreResult<Vec<String>>;

    /// Close the connection. Later operations through it fail.
    async fn close(&self) -> StoreResult<()>;
}
