//! The handle a patch definition registers itself on.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use docpatch_store::Database;
use docpatch_stream::{AfterCallback, PatchWorker};
use docpatch_types::Document;

use crate::runner::RunSummary;

/// Runs once before the first document is read.
#[async_trait]
pub trait SetupHook: Send + Sync {
    async fn setup(&self, db: Arc<dyn Database>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> SetupHook for F
where
    F: Fn(Arc<dyn Database>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn setup(&self, db: Arc<dyn Database>) -> anyhow::Result<()> {
        (self)(db).await
    }
}

/// Runs once after the last document, with the run's totals.
#[async_trait]
pub trait TeardownHook: Send + Sync {
    async fn teardown(&self, summary: RunSummary) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> TeardownHook for F
where
    F: Fn(RunSummary) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn teardown(&self, summary: RunSummary) -> anyhow::Result<()> {
        (self)(summary).await
    }
}

/// The update a patch declares.
#[derive(Clone)]
pub struct UpdateDefinition {
    pub collection: String,
    pub query: Document,
    pub worker: Arc<dyn PatchWorker>,
}

/// Collects a patch definition.
///
/// ```ignore
/// run(|p: &mut PatchHandle| {
///     p.version("0.1.0");
///     p.update("users", doc! {}, |user: Document| async move {
///         anyhow::Ok(Some(doc! { "$rename": { "name": "username" } }))
///     });
/// }, options, &connector).await?;
/// ```
pub struct PatchHandle {
    db: Arc<dyn Database>,
    id: Option<String>,
    version: Option<String>,
    update: Option<UpdateDefinition>,
    setup: Option<Arc<dyn SetupHook>>,
    after: Option<Arc<dyn AfterCallback>>,
    teardown: Option<Arc<dyn TeardownHook>>,
}

impl PatchHandle {
    pub(crate) fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            id: None,
            version: None,
            update: None,
            setup: None,
            after: None,
            teardown: None,
        }
    }

    /// The system version this patch was written against.
    pub fn version(&mut self, version: impl Into<String>) -> &mut Self {
        self.version = Some(version.into());
        self
    }

    /// Declare the update: every document of `collection` matching `query`
    /// goes through `worker`. An empty query matches everything.
    ///
    /// Also assigns the run id, `patch_<epoch-millis>_<collection>`.
    pub fn update(
        &mut self,
        collection: impl Into<String>,
        query: Document,
        worker: impl PatchWorker + 'static,
    ) -> &mut Self {
        let collection = collection.into();
        self.id = Some(format!("patch_{}_{collection}", Utc::now().timestamp_millis()));
        self.update = Some(UpdateDefinition {
            collection,
            query,
            worker: Arc::new(worker),
        });
        self
    }

    /// Registers a hook run before the first document is read.
    pub fn setup(&mut self, hook: impl SetupHook + 'static) -> &mut Self {
        self.setup = Some(Arc::new(hook));
        self
    }

    /// Called for every document once its outcome is known.
    pub fn after(&mut self, callback: impl AfterCallback + 'static) -> &mut Self {
        self.after = Some(Arc::new(callback));
        self
    }

    /// Registers a hook run once the stream ends, on success or failure.
    pub fn teardown(&mut self, hook: impl TeardownHook + 'static) -> &mut Self {
        self.teardown = Some(Arc::new(hook));
        self
    }

    /// The application database.
    pub fn db(&self) -> Arc<dyn Database> {
        Arc::clone(&self.db)
    }

    /// The run id, known once the update is declared.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn into_parts(self) -> HandleParts {
        HandleParts {
            id: self.id,
            version: self.version,
            update: self.update,
            setup: self.setup,
            after: self.after,
            teardown: self.teardown,
        }
    }
}

pub(crate) struct HandleParts {
    pub id: Option<String>,
    pub version: Option<String>,
    pub update: Option<UpdateDefinition>,
    pub setup: Option<Arc<dyn SetupHook>>,
    pub after: Option<Arc<dyn AfterCallback>>,
    pub teardown: Option<Arc<dyn TeardownHook>>,
}
