use serde_json::{Map, Value};

use crate::error::TypeError;

/// A stored document: a top-level JSON object.
pub type Document = Map<String, Value>;

/// The identity key every stored document carries.
pub const ID_FIELD: &str = "_id";

/// The `_id` of a document, if it has one.
pub fn document_id(document: &Document) -> Option<&Value> {
    document.get(ID_FIELD)
}

/// Selection matching exactly the document with the given `_id`.
pub fn id_query(id: &Value) -> Document {
    let mut query = Map::new();
    query.insert(ID_FIELD.to_string(), id.clone());
    query
}

/// Conjunction of several selections: `{"$and": [..]}`.
pub fn and_query<I>(clauses: I) -> Document
where
    I: IntoIterator<Item = Document>,
{
    let clauses = clauses.into_iter().map(Value::Object).collect();
    let mut query = Map::new();
    query.insert("$and".to_string(), Value::Array(clauses));
    query
}

/// Convert an arbitrary value into a document, rejecting non-objects.
pub fn to_document(value: Value) -> Result<Document, TypeError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TypeError::ExpectedDocument(kind_name(&other).to_string())),
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_query_selects_by_identity() {
        let query = id_query(&json!(7));
        assert_eq!(Value::Object(query), json!({ "_id": 7 }));
    }

    #[test]
    fn and_query_wraps_clauses() {
        let query = and_query([crate::doc! { "a": 1 }, crate::doc! { "b": 2 }]);
        assert_eq!(Value::Object(query), json!({ "$and": [{ "a": 1 }, { "b": 2 }] }));
    }

    #[test]
    fn to_document_rejects_scalars() {
        assert_eq!(
            to_document(json!([1, 2])),
            Err(TypeError::ExpectedDocument("array".into()))
        );
        assert!(to_document(json!({ "x": 1 })).is_ok());
    }

    #[test]
    fn document_id_reads_identity() {
        let doc = crate::doc! { "_id": "a", "name": "x" };
        assert_eq!(document_id(&doc), Some(&json!("a")));
        assert_eq!(document_id(&Document::new()), None);
    }
}
