//! Document collections for docpatch.
//!
//! Patches read and write documents through the async [`Collection`] and
//! [`Database`] traits. The only correctness primitive the patch pipeline
//! relies on is [`Collection::find_and_modify`]: select one document by a
//! query and apply a modifier to it atomically.
//!
//! # Backends
//!
//! - [`InMemoryDatabase`] -- `BTreeMap`-based store for tests, the CLI, and
//!   embedding. Handed out by [`MemoryConnector`].
//!
//! # Query and Modifier Language
//!
//! - [`matches`] evaluates a selection document (`{"age": {"$gt": 30}}`)
//! - [`apply_modifier`] applies an update document (`{"$set": {...}}`) or a
//!   whole-document replacement

pub mod connector;
pub mod error;
pub mod memory;
pub mod modifier;
pub mod query;
pub mod traits;

pub use connector::{Connector, MemoryConnector};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryCollection, InMemoryDatabase};
pub use modifier::{apply_modifier, is_operator_update};
pub use query::{matches, CANONICAL_OPERATOR};
pub use traits::{Collection, Database, DocumentCursor};
