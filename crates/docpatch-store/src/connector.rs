use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryDatabase;
use crate::traits::Database;

/// URI scheme accepted by [`MemoryConnector`].
const MEMORY_SCHEME: &str = "memory://";

/// Opens database connections from a target string.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &str) -> StoreResult<Arc<dyn Database>>;
}

/// Hands out shared named in-memory databases.
///
/// `memory://users` and `users` name the same database. Each call to
/// [`connect`](Connector::connect) returns a new handle onto the shared data,
/// so closing one connection does not affect the others.
#[derive(Default)]
pub struct MemoryConnector {
    databases: RwLock<HashMap<String, InMemoryDatabase>>,
}

impl MemoryConnector {
    /// Connector with no databases yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The database registered under `target`, created on first use.
    pub fn database(&self, target: &str) -> StoreResult<InMemoryDatabase> {
        let name = database_name(target)?;
        let mut databases = self.databases.write().expect("lock poisoned");
        let database = databases
            .entry(name.to_string())
            .or_insert_with(|| InMemoryDatabase::new(name));
        Ok(database.reconnect())
    }
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .databases
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        f.debug_struct("MemoryConnector").field("databases", &names).finish()
    }
}

fn database_name(target: &str) -> StoreResult<&str> {
    let name = target.strip_prefix(MEMORY_SCHEME).unwrap_or(target).trim_matches('/');
    if name.is_empty() || name.contains('/') {
        return Err(StoreError::InvalidTarget(target.to_string()));
    }
    Ok(name)
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, target: &str) -> StoreResult<Arc<dyn Database>> {
        let database = self.database(target)?;
        debug!(target = %target, database = %database.name(), "connected");
        Ok(Arc::new(database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpatch_types::{doc, Document};

    #[tokio::test]
    async fn scheme_and_bare_name_share_data() {
        let connector = MemoryConnector::new();
        let a = connector.connect("memory://app").await.unwrap();
        let b = connector.connect("app").await.unwrap();
        a.collection("users").insert(doc! { "_id": 1 }).await.unwrap();
        assert_eq!(b.collection("users").count(&Document::new()).await.unwrap(), 1);
        assert_eq!(b.name(), "app");
    }

    #[tokio::test]
    async fn closing_one_handle_keeps_others_open() {
        let connector = MemoryConnector::new();
        let a = connector.connect("app").await.unwrap();
        let b = connector.connect("app").await.unwrap();
        a.close().await.unwrap();
        assert!(a.collection_names().await.is_err());
        assert!(b.collection_names().await.is_ok());
    }

    #[tokio::test]
    async fn rejects_malformed_targets() {
        let connector = MemoryConnector::new();
        for target in ["", "memory://", "memory://a/b"] {
            let err = connector.connect(target).await.err().unwrap();
            assert!(matches!(err, StoreError::InvalidTarget(_)), "{target}");
        }
    }
}
