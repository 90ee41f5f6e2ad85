//! Structural diff engine for docpatch.
//!
//! Compares two documents at leaf-path granularity. Documents are flattened
//! to `path -> leaf` maps (array indices are path components) and every path
//! present on either side is classified as added, removed, or updated.
//!
//! # Key Types
//!
//! - [`CountedDiff`] / [`DiffCounts`] -- per-path `{added, removed, updated}` counters,
//!   suitable for accumulating across many documents
//! - [`deep`] -- labeled tree in the documents' own shape
//! - [`DiffOptions`] -- grouping of array indices into `[*]`
//!
//! The engine is pure and total: it never fails.

pub mod counted;
pub mod flatten;
pub mod labeled;

pub use counted::{changes, diff, diff_into, ChangeKind, CountedDiff, DiffCounts, DiffOptions};
pub use flatten::flatten;
pub use labeled::deep;
