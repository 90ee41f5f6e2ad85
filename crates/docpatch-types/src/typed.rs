//! Extended JSON typed leaves.
//!
//! Values that are not plain JSON (object ids, dates, 64-bit integers,
//! decimals, binary data) are carried as single-key wrapper objects such as
//! `{"$oid": "5f1d..."}`. A wrapper is a leaf: it is never descended into,
//! and two wrappers are equal when their type and string form are equal.

use serde_json::Value;

use crate::canonical::canonical_string;

const TYPED_KEYS: &[(&str, &str)] = &[
    ("$oid", "ObjectId"),
    ("$date", "Date"),
    ("$numberLong", "Long"),
    ("$numberInt", "Int"),
    ("$numberDouble", "Double"),
    ("$numberDecimal", "Decimal128"),
    ("$binary", "Binary"),
    ("$uuid", "UUID"),
    ("$timestamp", "Timestamp"),
    ("$regularExpression", "RegExp"),
    ("$symbol", "Symbol"),
    ("$code", "Code"),
    ("$minKey", "MinKey"),
    ("$maxKey", "MaxKey"),
];

/// A recognised Extended JSON wrapper.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TypedLeaf<'a> {
    /// Human-readable type name, e.g. `"ObjectId"`.
    pub type_name: &'static str,
    /// The wrapped payload.
    pub value: &'a Value,
}

impl<'a> TypedLeaf<'a> {
    /// Recognise `value` as a typed wrapper.
    pub fn detect(value: &'a Value) -> Option<Self> {
        let Value::Object(map) = value else {
            return None;
        };
        if map.len() != 1 {
            return None;
        }
        let (key, inner) = map.iter().next()?;
        TYPED_KEYS
            .iter()
            .find(|(typed_key, _)| *typed_key == key.as_str())
            .map(|(_, type_name)| Self {
                type_name: *type_name,
                value: inner,
            })
    }

    /// Type-tagged string form, `"<type>#<value>"`.
    pub fn tag(&self) -> String {
        let value = match self.value {
            Value::String(s) => s.clone(),
            other => canonical_string(other),
        };
        format!("{}#{}", self.type_name, value)
    }
}

/// Whether `value` is a typed wrapper rather than a plain object.
pub fn is_typed_leaf(value: &Value) -> bool {
    TypedLeaf::detect(value).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_object_id() {
        let value = json!({ "$oid": "5f1d7f1b9d3c2a0001a1b2c3" });
        let leaf = TypedLeaf::detect(&value).expect("typed");
        assert_eq!(leaf.type_name, "ObjectId");
        assert_eq!(leaf.tag(), "ObjectId#5f1d7f1b9d3c2a0001a1b2c3");
    }

    #[test]
    fn plain_objects_are_not_typed() {
        assert!(!is_typed_leaf(&json!({ "city": "Aarhus" })));
        assert!(!is_typed_leaf(&json!({ "$oid": "a", "extra": 1 })));
        assert!(!is_typed_leaf(&json!("5f1d")));
    }

    #[test]
    fn same_string_different_type_differs() {
        let long = json!({ "$numberLong": "42" });
        let decimal = json!({ "$numberDecimal": "42" });
        let a = TypedLeaf::detect(&long).unwrap().tag();
        let b = TypedLeaf::detect(&decimal).unwrap().tag();
        assert_ne!(a, b);
    }

    #[test]
    fn structured_payload_uses_canonical_form() {
        let ts = json!({ "$timestamp": { "t": 1, "i": 2 } });
        assert_eq!(TypedLeaf::detect(&ts).unwrap().tag(), r#"Timestamp#{"i":2,"t":1}"#);
    }
}
