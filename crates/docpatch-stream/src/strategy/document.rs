use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use docpatch_store::CANONICAL_OPERATOR;
use docpatch_types::{and_query, canonical_document, document_id, id_query, Document};

use crate::error::StreamResult;
use crate::patch::Patch;
use crate::strategy::UpdateStrategy;
use crate::worker::PatchWorker;

/// Attempts allowed before the document strategy falls back to the
/// canonical-form comparison.
pub const DEFAULT_ATTEMPT_LIMIT: u32 = 5;

/// Optimistic-concurrency strategy.
///
/// The modifier is applied only if the stored document still equals
/// `before`. On a conflict the document is re-fetched, the worker is re-run
/// on the current version, and the update is tried again. Once `attempts`
/// reaches the limit, one last try compares the whole document by canonical
/// form instead; its outcome is final.
#[derive(Clone)]
pub struct DocumentStrategy {
    worker: Arc<dyn PatchWorker>,
    attempt_limit: u32,
}

/// Where a patch is in the optimistic-concurrency protocol.
#[derive(Debug)]
enum State {
    /// Decide between another regular attempt and the fallback.
    Verifying,
    /// Apply guarded by `before` and the query.
    Applying,
    /// The guarded apply matched nothing; look for the current version.
    Refetching,
    /// Re-run the worker on the current version.
    Reapplying(Document),
    /// Final attempt guarded by the canonical form of `before`.
    FallenBack,
    Succeeded(Document),
    Skipped,
}

impl DocumentStrategy {
    /// Strategy re-running `worker` on conflicts, with the default attempt limit.
    pub fn new(worker: Arc<dyn PatchWorker>) -> Self {
        Self {
            worker,
            attempt_limit: DEFAULT_ATTEMPT_LIMIT,
        }
    }

    /// Sets the attempt limit; values below 1 count as 1.
    pub fn with_attempt_limit(mut self, attempt_limit: u32) -> Self {
        self.attempt_limit = attempt_limit.max(1);
        self
    }

    /// Attempts made before a conflict is reported.
    pub fn attempt_limit(&self) -> u32 {
        self.attempt_limit
    }

    async fn step(&self, state: State, patch: &mut Patch) -> StreamResult<State> {
        let id = document_id(&patch.before).cloned().unwrap_or(Value::Null);
        let next = match state {
            State::Verifying => {
                if patch.attempts >= self.attempt_limit {
                    State::FallenBack
                } else {
                    State::Applying
                }
            }
            State::Applying => {
                let Some(modifier) = patch.modifier.as_ref() else {
                    return Ok(State::Skipped);
                };
                let selection = and_query([patch.before.clone(), patch.query.clone()]);
                match patch
                    .collection
                    .find_and_modify(&selection, modifier)
                    .await
                    .map_err(|err| patch.store_error(err))?
                {
                    Some(after) => State::Succeeded(after),
                    None => State::Refetching,
                }
            }
            State::Refetching => {
                let selection = and_query([patch.query.clone(), id_query(&id)]);
                let current = patch
                    .collection
                    .find_one(&selection)
                    .await
                    .map_err(|err| patch.store_error(err))?;
                match current {
                    Some(current) => State::Reapplying(current),
                    None => {
                        debug!(id = %id, attempts = patch.attempts, "document gone or no longer matches, skipped");
                        State::Skipped
                    }
                }
            }
            State::Reapplying(current) => {
                let outcome = self.worker.modifier(current.clone()).await;
                patch.before = current;
                match outcome {
                    Ok(Some(modifier)) => {
                        patch.modifier = Some(modifier);
                        patch.attempts += 1;
                        debug!(id = %id, attempts = patch.attempts, "conflict, retrying with refreshed document");
                        State::Verifying
                    }
                    Ok(None) => {
                        patch.modifier = None;
                        debug!(id = %id, "worker declined refreshed document, skipped");
                        State::Skipped
                    }
                    Err(err) => {
                        patch.modifier = None;
                        return Err(patch.worker_error(err));
                    }
                }
            }
            State::FallenBack => {
                patch.attempts += 1;
                let Some(modifier) = patch.modifier.as_ref() else {
                    return Ok(State::Skipped);
                };
                let mut canonical = Document::new();
                canonical.insert(
                    CANONICAL_OPERATOR.to_string(),
                    Value::String(canonical_document(&patch.before)),
                );
                let selection = and_query([canonical, patch.query.clone()]);
                debug!(id = %id, attempts = patch.attempts, "attempt limit reached, comparing canonical form");
                match patch
                    .collection
                    .find_and_modify(&selection, modifier)
                    .await
                    .map_err(|err| patch.store_error(err))?
                {
                    Some(after) => State::Succeeded(after),
                    None => State::Skipped,
                }
            }
            terminal @ (State::Succeeded(_) | State::Skipped) => terminal,
        };
        Ok(next)
    }
}

impl std::fmt::Debug for DocumentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStrategy")
            .field("attempt_limit", &self.attempt_limit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UpdateStrategy for DocumentStrategy {
    async fn apply(&self, patch: &mut Patch) -> StreamResult<Option<Document>> {
        let mut state = State::Verifying;
        loop {
            state = match self.step(state, patch).await? {
                State::Succeeded(after) => return Ok(Some(after)),
                State::Skipped => return Ok(None),
                next => next,
            };
        }
    }
}
