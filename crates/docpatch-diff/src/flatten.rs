//! Document flattening.

use std::collections::BTreeMap;

use serde_json::Value;

use docpatch_types::{is_typed_leaf, values_equal, Document, Path, Segment, TypedLeaf};

/// Flatten a document into `path -> leaf`.
///
/// Objects and arrays are descended uniformly. Scalars, typed wrappers,
/// empty arrays and empty objects are leaves.
pub fn flatten(document: &Document) -> BTreeMap<Path, &Value> {
    let mut leaves = BTreeMap::new();
    for (key, value) in document {
        walk(value, Path::root().child(Segment::Key(key.clone())), &mut leaves);
    }
    leaves
}

fn walk<'a>(value: &'a Value, path: Path, leaves: &mut BTreeMap<Path, &'a Value>) {
    match value {
        Value::Object(map) if !map.is_empty() && !is_typed_leaf(value) => {
            for (key, child) in map {
                walk(child, path.child(Segment::Key(key.clone())), leaves);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                walk(child, path.child(Segment::Index(index)), leaves);
            }
        }
        _ => {
            leaves.insert(path, value);
        }
    }
}

/// Whether two leaves hold the same value.
///
/// Typed wrappers compare by `"<type>#<value>"`; everything else compares
/// structurally with numbers equal across integer and float forms.
pub(crate) fn leaves_equal(a: &Value, b: &Value) -> bool {
    match (TypedLeaf::detect(a), TypedLeaf::detect(b)) {
        (Some(x), Some(y)) => x.tag() == y.tag(),
        (None, None) => values_equal(a, b),
        _ => false,
    }
}

/// Whether a leaf is an empty array or empty object.
pub(crate) fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Whether `leaves` holds any path strictly below `path`.
pub(crate) fn has_descendants(leaves: &BTreeMap<Path, &Value>, path: &Path) -> bool {
    leaves
        .range(path.clone()..)
        .find(|(candidate, _)| *candidate != path)
        .is_some_and(|(candidate, _)| candidate.is_descendant_of(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpatch_types::doc;
    use serde_json::json;

    fn rendered(document: &Document) -> Vec<(String, Value)> {
        flatten(document)
            .into_iter()
            .map(|(path, value)| (path.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn nested_objects_and_arrays() {
        let doc = doc! { "a": { "b": 1 }, "tags": ["x", { "y": 2 }] };
        assert_eq!(
            rendered(&doc),
            vec![
                ("a.b".to_string(), json!(1)),
                ("tags.0".to_string(), json!("x")),
                ("tags.1.y".to_string(), json!(2)),
            ]
        );
    }

    #[test]
    fn empty_containers_are_leaves() {
        let doc = doc! { "tags": [], "meta": {} };
        assert_eq!(
            rendered(&doc),
            vec![("meta".to_string(), json!({})), ("tags".to_string(), json!([]))]
        );
    }

    #[test]
    fn typed_wrappers_are_leaves() {
        let doc = doc! { "_id": { "$oid": "abc" } };
        assert_eq!(rendered(&doc), vec![("_id".to_string(), json!({ "$oid": "abc" }))]);
    }

    #[test]
    fn typed_leaf_equality_uses_tag() {
        assert!(leaves_equal(&json!({ "$date": "2014-01-01" }), &json!({ "$date": "2014-01-01" })));
        assert!(!leaves_equal(&json!({ "$date": "1" }), &json!({ "$numberLong": "1" })));
        assert!(!leaves_equal(&json!({ "$numberLong": "1" }), &json!("1")));
        assert!(leaves_equal(&json!(3), &json!(3.0)));
        assert!(!leaves_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn descendants_are_found_after_sibling_keys() {
        let doc = doc! { "lang": [ "en" ], "lang2": 1 };
        let leaves = flatten(&doc);
        let lang = Path::root().child(Segment::Key("lang".into()));
        assert!(has_descendants(&leaves, &lang));
        let lang2 = Path::root().child(Segment::Key("lang2".into()));
        assert!(!has_descendants(&leaves, &lang2));
    }
}
