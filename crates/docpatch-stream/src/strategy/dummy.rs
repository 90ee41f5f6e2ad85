use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use docpatch_store::{Collection, Database};
use docpatch_types::{document_id, id_query, Document};

use crate::error::StreamResult;
use crate::patch::Patch;
use crate::strategy::UpdateStrategy;

/// Scratch collection used by dry runs.
pub const SCRATCH_COLLECTION: &str = "_patch_tmp";

/// Dry-run strategy.
///
/// Copies `before` into the scratch collection, applies the modifier there,
/// and deletes the copy. The real collection is never written.
#[derive(Clone)]
pub struct DummyStrategy {
    scratch: Arc<dyn Collection>,
}

impl DummyStrategy {
    /// Strategy using the scratch collection of `database`.
    pub fn new(database: &dyn Database) -> Self {
        Self {
            scratch: database.collection(SCRATCH_COLLECTION),
        }
    }

    /// Strategy using `scratch` as its scratch collection.
    pub fn with_collection(scratch: Arc<dyn Collection>) -> Self {
        Self { scratch }
    }
}

impl std::fmt::Debug for DummyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyStrategy")
            .field("scratch", &self.scratch.name())
            .finish()
    }
}

#[async_trait]
impl UpdateStrategy for DummyStrategy {
    async fn apply(&self, patch: &mut Patch) -> StreamResult<Option<Document>> {
        let Some(modifier) = patch.modifier.as_ref() else {
            return Ok(None);
        };
        let id = document_id(&patch.before).cloned().unwrap_or(Value::Null);
        let selection = id_query(&id);

        self.scratch
            .save(patch.before.clone())
            .await
            .map_err(|err| patch.store_error(err))?;

        let applied = self.scratch.find_and_modify(&selection, modifier).await;

        let cleanup = self.scratch.remove(&selection).await;
        let after = applied.map_err(|err| patch.store_error(err))?;
        if let Err(err) = cleanup {
            warn!(id = %id, error = %err, "failed to remove scratch copy");
            return Err(patch.store_error(err));
        }
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpatch_store::InMemoryDatabase;
    use docpatch_types::doc;
    use serde_json::json;

    #[tokio::test]
    async fn real_collection_is_untouched() {
        let db = InMemoryDatabase::new("test");
        let users = db.collection("users");
        users.insert(doc! { "_id": 1, "name": "user_1" }).await.unwrap();
        let before = users.find_one(&doc! { "_id": 1 }).await.unwrap().unwrap();

        let mut patch = Patch::new(
            users.clone(),
            Document::new(),
            before.clone(),
            doc! { "$rename": { "name": "username" } },
        );
        let after = DummyStrategy::new(&db).apply(&mut patch).await.unwrap().unwrap();
        assert_eq!(Value::Object(after), json!({ "_id": 1, "username": "user_1" }));

        let stored = users.find_one(&doc! { "_id": 1 }).await.unwrap().unwrap();
        assert_eq!(stored, before);
        let scratch = db.collection(SCRATCH_COLLECTION);
        assert_eq!(scratch.count(&Document::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_modifier_still_cleans_up() {
        let db = InMemoryDatabase::new("test");
        let users = db.collection("users");
        let mut patch = Patch::new(
            users,
            Document::new(),
            doc! { "_id": 1, "name": "user_1" },
            doc! { "$inc": { "name": 1 } },
        );
        let err = DummyStrategy::new(&db).apply(&mut patch).await.unwrap_err();
        assert!(err.patch().is_some());
        let scratch = db.collection(SCRATCH_COLLECTION);
        assert_eq!(scratch.count(&Document::new()).await.unwrap(), 0);
    }
}
