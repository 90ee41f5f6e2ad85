//! Document model for docpatch.
//!
//! Documents are JSON-like trees (`serde_json::Map<String, Value>`) keyed by
//! an `_id` field. Every other docpatch crate depends on `docpatch-types` for
//! the shared vocabulary of paths, leaf types, ordering, and canonical form.
//!
//! # Key Types
//!
//! - [`Document`] -- a stored document (top-level JSON object)
//! - [`Path`] / [`Segment`] -- typed flattened path into a document
//! - [`TypedLeaf`] -- Extended JSON wrapper (`{"$oid": ...}`, `{"$date": ...}`)
//! - [`OrderedValue`] -- `Value` with the store's total ordering
//! - [`canonical_string`] -- deterministic serialization with sorted keys

pub mod canonical;
pub mod document;
pub mod error;
pub mod ordering;
pub mod path;
pub mod typed;

pub use canonical::{canonical_document, canonical_string};
pub use document::{and_query, document_id, id_query, to_document, Document, ID_FIELD};
pub use error::TypeError;
pub use ordering::{compare_values, values_equal, OrderedValue};
pub use path::{get_field, remove_field, set_field, split_field, Path, Segment};
pub use typed::{is_typed_leaf, TypedLeaf};

#[doc(hidden)]
pub use serde_json as __serde_json;

/// Build a [`Document`] with `serde_json::json!` object syntax.
///
/// ```
/// let doc = docpatch_types::doc! { "name": "user_1", "tags": [] };
/// assert_eq!(doc["name"], "user_1");
/// ```
#[macro_export]
macro_rules! doc {
    ($($body:tt)*) => {
        match $crate::__serde_json::json!({ $($body)* }) {
            $crate::__serde_json::Value::Object(map) => map,
            _ => unreachable!("json! object literal always yields an object"),
        }
    };
}
