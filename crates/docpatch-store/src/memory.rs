use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::debug;

use docpatch_types::{Document, OrderedValue, ID_FIELD};

use crate::error::{StoreError, StoreResult};
use crate::modifier::apply_modifier;
use crate::query::matches;
use crate::traits::{Collection, Database, DocumentCursor};

type Documents = BTreeMap<OrderedValue, Document>;

/// In-memory database.
///
/// Collections live in one `BTreeMap` behind a single `RwLock`, documents
/// ordered by `_id`. Every mutation holds the write lock for its whole
/// read-modify-write, which makes `find_and_modify` atomic. Handles created
/// with [`reconnect`](Self::reconnect) share the data but close
/// independently.
#[derive(Clone)]
pub struct InMemoryDatabase {
    name: String,
    collections: Arc<RwLock<BTreeMap<String, Documents>>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryDatabase {
    /// Create a new empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: Arc::new(RwLock::new(BTreeMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A fresh, open handle onto the same data.
    pub fn reconnect(&self) -> Self {
        Self {
            name: self.name.clone(),
            collections: Arc::clone(&self.collections),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Typed handle to a collection.
    pub fn memory_collection(&self, name: &str) -> InMemoryCollection {
        InMemoryCollection {
            name: name.to_string(),
            database: self.clone(),
        }
    }

    /// Copy of every collection's documents in `_id` order.
    ///
    /// Works on closed handles too, so results can be read after a run.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Document>> {
        let collections = self.collections.read().expect("lock poisoned");
        collections
            .iter()
            .map(|(name, documents)| (name.clone(), documents.values().cloned().collect()))
            .collect()
    }

    /// True once the database has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed(self.name.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.collections.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryDatabase")
            .field("name", &self.name)
            .field("collection_count", &count)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(self.memory_collection(name))
    }

    async fn create_collection(&self, name: &str) -> StoreResult<Arc<dyn Collection>> {
        self.ensure_open()?;
        self.collections
            .write()
            .expect("lock poisoned")
            .entry(name.to_string())
            .or_default();
        Ok(self.collection(name))
    }

    async fn collection_names(&self) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.collections.read().expect("lock poisoned").keys().cloned().collect())
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(database = %self.name, "closed in-memory database handle");
        }
        Ok(())
    }
}

/// A collection inside an [`InMemoryDatabase`].
#[derive(Clone, Debug)]
pub struct InMemoryCollection {
    name: String,
    database: InMemoryDatabase,
}

impl InMemoryCollection {
    fn read_matching(&self, query: &Document, limit: Option<usize>) -> StoreResult<Vec<Document>> {
        self.database.ensure_open()?;
        let collections = self.database.collections.read().expect("lock poisoned");
        let mut found = Vec::new();
        let Some(documents) = collections.get(&self.name) else {
            return Ok(found);
        };
        for document in documents.values() {
            if limit.is_some_and(|limit| found.len() >= limit) {
                break;
            }
            if matches(document, query)? {
                found.push(document.clone());
            }
        }
        Ok(found)
    }

    /// Apply `modifier` to the first match under the write lock.
    fn modify_first(&self, query: &Document, modifier: &Document) -> StoreResult<Option<Document>> {
        self.database.ensure_open()?;
        let mut collections = self.database.collections.write().expect("lock poisoned");
        let Some(documents) = collections.get_mut(&self.name) else {
            return Ok(None);
        };
        let mut target = None;
        for (key, document) in documents.iter() {
            if matches(document, query)? {
                target = Some(key.clone());
                break;
            }
        }
        let Some(key) = target else {
            return Ok(None);
        };
        let Some(current) = documents.get_mut(&key) else {
            return Ok(None);
        };
        let updated = apply_modifier(current, modifier)?;
        *current = updated.clone();
        Ok(Some(updated))
    }
}

fn with_id(mut document: Document) -> (OrderedValue, Document) {
    let id = match document.get(ID_FIELD) {
        Some(id) => id.clone(),
        None => {
            let id = Value::String(uuid::Uuid::now_v7().to_string());
            document.insert(ID_FIELD.to_string(), id.clone());
            id
        }
    };
    (OrderedValue(id), document)
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &Document) -> StoreResult<DocumentCursor> {
        let documents = self.read_matching(query, None)?;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn find_one(&self, query: &Document) -> StoreResult<Option<Document>> {
        Ok(self.read_matching(query, Some(1))?.into_iter().next())
    }

    async fn count(&self, query: &Document) -> StoreResult<u64> {
        Ok(self.read_matching(query, None)?.len() as u64)
    }

    async fn find_and_modify(
        &self,
        query: &Document,
        modifier: &Document,
    ) -> StoreResult<Option<Document>> {
        self.modify_first(query, modifier)
    }

    async fn insert(&self, document: Document) -> StoreResult<Document> {
        self.database.ensure_open()?;
        let (id, document) = with_id(document);
        let mut collections = self.database.collections.write().expect("lock poisoned");
        let documents = collections.entry(self.name.clone()).or_default();
        if documents.contains_key(&id) {
            return Err(StoreError::DuplicateKey(id.as_value().to_string()));
        }
        documents.insert(id, document.clone());
        Ok(document)
    }

    async fn save(&self, document: Document) -> StoreResult<Document> {
        self.database.ensure_open()?;
        let (id, document) = with_id(document);
        let mut collections = self.database.collections.write().expect("lock poisoned");
        collections
            .entry(self.name.clone())
            .or_default()
            .insert(id, document.clone());
        Ok(document)
    }

    async fn update(&self, query: &Document, modifier: &Document) -> StoreResult<bool> {
        Ok(self.modify_first(query, modifier)?.is_some())
    }

    async fn remove(&self, query: &Document) -> StoreResult<u64> {
        self.database.ensure_open()?;
        let mut collections = self.database.collections.write().expect("lock poisoned");
        let Some(documents) = collections.get_mut(&self.name) else {
            return Ok(0);
        };
        let mut doomed = Vec::new();
        for (key, document) in documents.iter() {
            if matches(document, query)? {
                doomed.push(key.clone());
            }
        }
        for key in &doomed {
            documents.remove(key);
        }
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpatch_types::doc;
    use futures::TryStreamExt;
    use serde_json::json;

    async fn seeded() -> InMemoryDatabase {
        let db = InMemoryDatabase::new("test");
        let users = db.collection("users");
        for (id, name) in [(3, "user_3"), (1, "user_1"), (2, "user_2")] {
            users.insert(doc! { "_id": id, "name": name }).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn find_is_sorted_by_id() {
        let db = seeded().await;
        let found: Vec<Document> = db
            .collection("users")
            .find(&Document::new())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<Value> = found.iter().map(|doc| doc["_id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn insert_assigns_id_and_rejects_duplicates() {
        let db = InMemoryDatabase::new("test");
        let users = db.collection("users");
        let stored = users.insert(doc! { "name": "x" }).await.unwrap();
        assert!(stored["_id"].is_string());
        let err = users.insert(stored.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn find_and_modify_returns_new_document() {
        let db = seeded().await;
        let users = db.collection("users");
        let updated = users
            .find_and_modify(&doc! { "name": "user_2" }, &doc! { "$set": { "age": 20 } })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Value::Object(updated), json!({ "_id": 2, "name": "user_2", "age": 20 }));

        let missing = users
            .find_and_modify(&doc! { "name": "nobody" }, &doc! { "$set": { "age": 1 } })
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn failed_modifier_leaves_document_untouched() {
        let db = seeded().await;
        let users = db.collection("users");
        let err = users
            .find_and_modify(&doc! { "_id": 1 }, &doc! { "$inc": { "name": 1 } })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidModifier(_)));
        let current = users.find_one(&doc! { "_id": 1 }).await.unwrap().unwrap();
        assert_eq!(current["name"], json!("user_1"));
    }

    #[tokio::test]
    async fn save_upserts_and_remove_deletes_matches() {
        let db = seeded().await;
        let users = db.collection("users");
        users.save(doc! { "_id": 1, "name": "renamed" }).await.unwrap();
        users.save(doc! { "_id": 4, "name": "user_4" }).await.unwrap();
        assert_eq!(users.count(&Document::new()).await.unwrap(), 4);
        assert_eq!(users.find_one(&doc! { "_id": 1 }).await.unwrap().unwrap()["name"], json!("renamed"));

        let removed = users.remove(&doc! { "_id": { "$gte": 3 } }).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(users.count(&Document::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn collections_exist_once_written() {
        let db = seeded().await;
        let _ = db.collection("empty");
        assert_eq!(db.collection_names().await.unwrap(), vec!["users".to_string()]);
        db.create_collection("albums").await.unwrap();
        assert_eq!(
            db.collection_names().await.unwrap(),
            vec!["albums".to_string(), "users".to_string()]
        );
        assert_eq!(db.collection("missing").remove(&Document::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_handle_rejects_operations() {
        let db = seeded().await;
        db.close().await.unwrap();
        let err = db.collection("users").count(&Document::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Closed(name) if name == "test"));

        let reopened = db.reconnect();
        assert_eq!(reopened.collection("users").count(&Document::new()).await.unwrap(), 3);
        assert_eq!(db.snapshot()["users"].len(), 3);
    }
}
