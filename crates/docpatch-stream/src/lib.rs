//! The docpatch pipeline.
//!
//! A patch run is a chain of ordered, concurrency-bounded stream stages:
//!
//! 1. [`patch_source`] reads matching documents in `_id` order and asks the
//!    worker for a modifier, producing [`Patch`]es.
//! 2. [`update_stream`] runs each patch through a [`PatchProcessor`]:
//!    a [`PatchApplier`] with one of the [`UpdateStrategy`] implementations,
//!    optionally wrapped in an [`AuditedProcessor`].
//! 3. [`track_progress`] attaches a [`ProgressSnapshot`] to each patch.
//!
//! Every stage preserves input order. The first error ends the stream after
//! all earlier patches have been emitted.

pub mod audit;
pub mod error;
pub mod ordered;
pub mod patch;
pub mod processor;
pub mod progress;
pub mod source;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use audit::AuditedProcessor;
pub use error::{error_chain, StreamError, StreamResult};
pub use ordered::{ordered_map, OrderedStream, DEFAULT_CONCURRENCY};
pub use patch::{Patch, PatchSnapshot};
pub use processor::{update_stream, PatchApplier, PatchProcessor};
pub use progress::{track_progress, ProgressSnapshot, ProgressTracker, SpeedMeter, SPEED_WINDOW};
pub use source::{patch_source, PatchStream};
pub use strategy::{
    DocumentStrategy, DummyStrategy, QueryStrategy, UpdateMode, UpdateStrategy,
    DEFAULT_ATTEMPT_LIMIT, SCRATCH_COLLECTION,
};
pub use worker::{AfterCallback, AfterUpdate, FixedModifier, PatchWorker};
