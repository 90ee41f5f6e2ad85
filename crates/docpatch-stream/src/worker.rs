//! User-supplied callbacks.
//!
//! Both traits have blanket implementations for async closures, so
//! `|doc| async move { ... }` can be passed wherever a worker or callback is
//! expected.

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use docpatch_types::Document;

/// Computes the modifier for one document.
///
/// Returning `Ok(None)` means the document needs no change.
#[async_trait]
pub trait PatchWorker: Send + Sync {
    async fn modifier(&self, document: Document) -> anyhow::Result<Option<Document>>;
}

#[async_trait]
impl<F, Fut> PatchWorker for F
where
    F: Fn(Document) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Document>>> + Send + 'static,
{
    async fn modifier(&self, document: Document) -> anyhow::Result<Option<Document>> {
        (self)(document).await
    }
}

/// Outcome of one patch, handed to the after-update callback.
///
/// All fields are copies; the callback cannot affect the pipeline's patch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AfterUpdate {
    pub before: Document,
    pub after: Option<Document>,
    pub modified: bool,
    pub diff: Option<Value>,
}

/// Invoked once per document after its outcome is known.
#[async_trait]
pub trait AfterCallback: Send + Sync {
    async fn after(&self, update: AfterUpdate) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> AfterCallback for F
where
    F: Fn(AfterUpdate) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn after(&self, update: AfterUpdate) -> anyhow::Result<()> {
        (self)(update).await
    }
}

/// A worker that returns the same modifier for every document.
#[derive(Clone, Debug)]
pub struct FixedModifier(pub Document);

#[async_trait]
impl PatchWorker for FixedModifier {
    async fn modifier(&self, _document: Document) -> anyhow::Result<Option<Document>> {
        Ok(Some(self.0.clone()))
    }
}
