//! Deterministic serialization.
//!
//! The canonical string of a value is its JSON text with object keys sorted
//! lexicographically at every level and no insignificant whitespace. Two
//! values have the same canonical string exactly when they are structurally
//! identical, regardless of key insertion order.

use serde_json::Value;

use crate::document::Document;

/// Canonical JSON text of `value`.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Canonical JSON text of a whole document.
pub fn canonical_document(document: &Document) -> String {
    let mut out = String::new();
    write_object(document, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(map, out),
        // Scalars already serialize deterministically.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(map: &Document, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
    }
    out.push('}');
}
