use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tracing::debug;

use crate::error::{StreamError, StreamResult};
use crate::ordered::ordered_map;
use crate::patch::Patch;
use crate::source::PatchStream;
use crate::strategy::UpdateStrategy;
use crate::worker::{AfterCallback, AfterUpdate};

/// Carries one patch through its update.
#[async_trait]
pub trait PatchProcessor: Send + Sync {
    async fn process(&self, patch: Patch) -> StreamResult<Patch>;
}

/// Applies a patch with an update strategy, annotates the outcome, and runs
/// the after-update callback.
#[derive(Clone)]
pub struct PatchApplier {
    strategy: Arc<dyn UpdateStrategy>,
    after_callback: Option<Arc<dyn AfterCallback>>,
}

impl PatchApplier {
    /// Applier writing through `strategy`, with no after callback.
    pub fn new(strategy: Arc<dyn UpdateStrategy>) -> Self {
        Self {
            strategy,
            after_callback: None,
        }
    }

    /// Runs `callback` after each applied patch.
    pub fn with_after_callback(mut self, callback: Arc<dyn AfterCallback>) -> Self {
        self.after_callback = Some(callback);
        self
    }
}

#[async_trait]
impl PatchProcessor for PatchApplier {
    async fn process(&self, mut patch: Patch) -> StreamResult<Patch> {
        let after = self.strategy.apply(&mut patch).await?;
        patch.annotate(after);
        debug!(
            id = %patch.id,
            modified = patch.modified,
            skipped = patch.skipped,
            attempts = patch.attempts,
            "patch applied"
        );

        if let Some(callback) = &self.after_callback {
            let update = AfterUpdate {
                before: patch.before.clone(),
                after: patch.after.clone(),
                modified: patch.modified,
                diff: patch.diff.clone(),
            };
            callback.after(update).await.map_err(|source| StreamError::Callback {
                source,
                patch: Box::new(patch.snapshot()),
            })?;
        }
        Ok(patch)
    }
}

/// Run every patch of `input` through `processor` with bounded concurrency,
/// preserving order.
pub fn update_stream<S>(input: S, processor: Arc<dyn PatchProcessor>, concurrency: usize) -> PatchStream
where
    S: Stream<Item = StreamResult<Patch>> + Send + 'static,
{
    ordered_map(input, concurrency, move |patch: Patch| {
        let processor = Arc::clone(&processor);
        async move { processor.process(patch).await.map(Some) }
    })
}
