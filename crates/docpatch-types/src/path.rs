//! Field paths into documents.
//!
//! Two flavours exist. Dotted field strings (`"location.city"`, `"tags.0"`)
//! are what queries and modifiers use; whether a component addresses an
//! object key or an array index is decided while traversing. [`Path`] is the
//! typed form produced by flattening, where every segment already knows
//! whether it came from an object or an array.

use std::fmt;

use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::TypeError;

/// Rendering of an array index collapsed by grouping.
pub const WILDCARD: &str = "[*]";

/// One component of a typed path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Object key.
    Key(String),
    /// Array position.
    Index(usize),
    /// Any array position (array indices collapsed by grouping).
    Wildcard,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
            Self::Wildcard => f.write_str(WILDCARD),
        }
    }
}

/// A typed path from the document root to a leaf.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Vec<Segment>);

impl Path {
    /// The empty (root) path.
    pub fn root() -> Self {
        Self::default()
    }

    /// A new path extended by one segment.
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// The parsed segments, in order.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// True for the empty path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` is a proper ancestor of this path.
    pub fn is_descendant_of(&self, prefix: &Path) -> bool {
        self.0.len() > prefix.0.len() && self.0.starts_with(&prefix.0)
    }

    /// The same path with every array index replaced by [`Segment::Wildcard`].
    pub fn grouped(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|segment| match segment {
                    Segment::Index(_) => Segment::Wildcard,
                    other => other.clone(),
                })
                .collect(),
        )
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Split a dotted field string into its components.
pub fn split_field(path: &str) -> Result<Vec<&str>, TypeError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(TypeError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

/// Read the value at a dotted field path.
///
/// Numeric components index into arrays; on objects they are plain keys.
pub fn get_field<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let parts = split_field(path).ok()?;
    let (head, rest) = parts.split_first()?;
    let mut current = document.get(*head)?;
    for part in rest {
        current = match current {
            Value::Object(map) => map.get(*part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at a dotted field path, creating missing intermediate
/// objects. Arrays addressed past their end are padded with `null`.
pub fn set_field(document: &mut Document, path: &str, value: Value) -> Result<(), TypeError> {
    let parts = split_field(path)?;
    set_in_map(document, &parts, value, path)
}

fn set_in_map(
    map: &mut Map<String, Value>,
    parts: &[&str],
    value: Value,
    path: &str,
) -> Result<(), TypeError> {
    let Some((head, rest)) = parts.split_first() else {
        return Err(TypeError::InvalidPath(path.to_string()));
    };
    if rest.is_empty() {
        map.insert((*head).to_string(), value);
        return Ok(());
    }
    let child = map.entry((*head).to_string()).or_insert(Value::Null);
    if child.is_null() {
        *child = Value::Object(Map::new());
    }
    set_in_value(child, rest, value, path)
}

fn set_in_value(
    target: &mut Value,
    parts: &[&str],
    value: Value,
    path: &str,
) -> Result<(), TypeError> {
    match target {
        Value::Object(map) => set_in_map(map, parts, value, path),
        Value::Array(items) => {
            let Some((head, rest)) = parts.split_first() else {
                return Err(TypeError::InvalidPath(path.to_string()));
            };
            let index = head.parse::<usize>().map_err(|_| TypeError::PathConflict {
                path: path.to_string(),
                segment: (*head).to_string(),
            })?;
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            if rest.is_empty() {
                items[index] = value;
                return Ok(());
            }
            let child = &mut items[index];
            if child.is_null() {
                *child = Value::Object(Map::new());
            }
            set_in_value(child, rest, value, path)
        }
        _ => Err(TypeError::PathConflict {
            path: path.to_string(),
            segment: parts.first().copied().unwrap_or_default().to_string(),
        }),
    }
}

/// Remove the value at a dotted field path and return it.
///
/// Array elements are not shifted: the slot is set to `null`, so positions
/// of the remaining elements are preserved.
pub fn remove_field(document: &mut Document, path: &str) -> Option<Value> {
    let parts = split_field(path).ok()?;
    let (last, parents) = parts.split_last()?;
    if parents.is_empty() {
        return document.remove(*last);
    }
    let (head, rest) = parents.split_first()?;
    let mut current = document.get_mut(*head)?;
    for part in rest {
        current = match current {
            Value::Object(map) => map.get_mut(*part)?,
            Value::Array(items) => items.get_mut(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Object(map) => map.remove(*last),
        Value::Array(items) => {
            let slot = items.get_mut(last.parse::<usize>().ok()?)?;
            Some(std::mem::replace(slot, Value::Null))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use serde_json::json;

    #[test]
    fn path_renders_dotted() {
        let path = Path::root()
            .child(Segment::Key("lang".into()))
            .child(Segment::Index(1))
            .child(Segment::Key("name".into()));
        assert_eq!(path.to_string(), "lang.1.name");
        assert_eq!(path.grouped().to_string(), "lang.[*].name");
    }

    #[test]
    fn descendant_requires_proper_prefix() {
        let lang = Path::root().child(Segment::Key("lang".into()));
        let item = lang.child(Segment::Index(0));
        assert!(item.is_descendant_of(&lang));
        assert!(!lang.is_descendant_of(&lang));
        assert!(!lang.is_descendant_of(&item));
    }

    #[test]
    fn split_rejects_empty_components() {
        assert!(split_field("a..b").is_err());
        assert!(split_field("").is_err());
        assert_eq!(split_field("a.b").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn get_nested_and_indexed() {
        let doc = doc! { "location": { "city": "Aarhus" }, "tags": ["a", "b"] };
        assert_eq!(get_field(&doc, "location.city"), Some(&json!("Aarhus")));
        assert_eq!(get_field(&doc, "tags.1"), Some(&json!("b")));
        assert_eq!(get_field(&doc, "tags.9"), None);
        assert_eq!(get_field(&doc, "location.city.x"), None);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = doc! { "name": "user_1" };
        set_field(&mut doc, "location.postcode", json!(8000)).unwrap();
        assert_eq!(doc["location"], json!({ "postcode": 8000 }));
    }

    #[test]
    fn set_pads_arrays() {
        let mut doc = doc! { "tags": ["a"] };
        set_field(&mut doc, "tags.2", json!("c")).unwrap();
        assert_eq!(doc["tags"], json!(["a", null, "c"]));
    }

    #[test]
    fn set_through_scalar_conflicts() {
        let mut doc = doc! { "name": "user_1" };
        let err = set_field(&mut doc, "name.first", json!("x")).unwrap_err();
        assert!(matches!(err, TypeError::PathConflict { .. }));
    }

    #[test]
    fn remove_nested_key() {
        let mut doc = doc! { "location": { "city": "Aarhus", "address": "Vej" } };
        assert_eq!(remove_field(&mut doc, "location.city"), Some(json!("Aarhus")));
        assert_eq!(doc["location"], json!({ "address": "Vej" }));
        assert_eq!(remove_field(&mut doc, "missing.key"), None);
    }

    #[test]
    fn remove_array_element_leaves_null() {
        let mut doc = doc! { "tags": ["a", "b"] };
        assert_eq!(remove_field(&mut doc, "tags.0"), Some(json!("a")));
        assert_eq!(doc["tags"], json!([null, "b"]));
    }
}
