//! High-level docpatch API.
//!
//! A patch is a closure that registers itself on a [`PatchHandle`]:
//! the system version it targets, the collection, query, and worker of its
//! update, and optional setup, after-update, and teardown hooks. [`run`]
//! checks the definition, connects through a [`Connector`], and returns a
//! [`PatchRun`] stream of the patched documents.
//!
//! [`Connector`]: docpatch_store::Connector

pub mod error;
pub mod handle;
pub mod options;
pub mod runner;

pub use error::{RunError, RunResult};
pub use handle::{PatchHandle, SetupHook, TeardownHook, UpdateDefinition};
pub use options::RunOptions;
pub use runner::{run, PatchRun, RunSummary, VERSION};

pub use docpatch_store::{Connector, MemoryConnector};
pub use docpatch_stream::{AfterUpdate, Patch, ProgressSnapshot, UpdateMode};
