//! Modifier application.
//!
//! A modifier is either a set of update operators (`{"$set": {...}}`) or a
//! plain document that replaces the target wholesale. Either way the
//! target's `_id` survives unchanged.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use docpatch_types::{
    compare_values, get_field, remove_field, set_field, values_equal, Document, ID_FIELD,
};

use crate::error::{StoreError, StoreResult};
use crate::query::{condition_matches, matches};

/// Whether `modifier` uses update operators rather than replacing the
/// document.
pub fn is_operator_update(modifier: &Document) -> bool {
    modifier.keys().any(|key| key.starts_with('$'))
}

/// Apply `modifier` to a copy of `document` and return the result.
pub fn apply_modifier(document: &Document, modifier: &Document) -> StoreResult<Document> {
    let updated = if is_operator_update(modifier) {
        if let Some(plain) = modifier.keys().find(|key| !key.starts_with('$')) {
            return Err(StoreError::InvalidModifier(format!(
                "cannot mix operators and plain field '{plain}'"
            )));
        }
        let mut updated = document.clone();
        for (operator, fields) in modifier {
            let Value::Object(fields) = fields else {
                return Err(StoreError::InvalidModifier(format!(
                    "{operator} expects a document"
                )));
            };
            for (path, argument) in fields {
                apply_operator(&mut updated, operator, path, argument)?;
            }
        }
        updated
    } else {
        replace(document, modifier)
    };

    if let Some(id) = document.get(ID_FIELD) {
        if !updated.get(ID_FIELD).is_some_and(|new_id| values_equal(id, new_id)) {
            return Err(StoreError::ImmutableField(ID_FIELD.to_string()));
        }
    }
    Ok(updated)
}

fn replace(document: &Document, replacement: &Document) -> Document {
    let mut updated = Map::new();
    // The replacement may restate `_id`; a differing one is caught afterwards.
    match (replacement.get(ID_FIELD), document.get(ID_FIELD)) {
        (Some(id), _) | (None, Some(id)) => {
            updated.insert(ID_FIELD.to_string(), id.clone());
        }
        (None, None) => {}
    }
    for (key, value) in replacement {
        if key != ID_FIELD {
            updated.insert(key.clone(), value.clone());
        }
    }
    updated
}

fn touches_id(path: &str) -> bool {
    path == ID_FIELD || path.starts_with("_id.")
}

fn apply_operator(
    document: &mut Document,
    operator: &str,
    path: &str,
    argument: &Value,
) -> StoreResult<()> {
    if touches_id(path) {
        let unchanged = operator == "$set"
            && get_field(document, path).is_some_and(|current| values_equal(current, argument));
        if unchanged {
            return Ok(());
        }
        return Err(StoreError::ImmutableField(path.to_string()));
    }

    match operator {
        "$set" => set_field(document, path, argument.clone())?,
        "$unset" => {
            remove_field(document, path);
        }
        "$inc" => {
            let delta = expect_number(operator, path, argument)?;
            let next = match get_field(document, path) {
                None | Some(Value::Null) => Value::Number(delta.clone()),
                Some(Value::Number(current)) => combine(current, delta, i64::checked_add, |a, b| a + b),
                Some(_) => return Err(non_numeric(operator, path)),
            };
            set_field(document, path, next)?;
        }
        "$mul" => {
            let factor = expect_number(operator, path, argument)?;
            let next = match get_field(document, path) {
                None | Some(Value::Null) => {
                    combine(&Number::from(0), factor, i64::checked_mul, |a, b| a * b)
                }
                Some(Value::Number(current)) => combine(current, factor, i64::checked_mul, |a, b| a * b),
                Some(_) => return Err(non_numeric(operator, path)),
            };
            set_field(document, path, next)?;
        }
        "$min" | "$max" => {
            let wanted = if operator == "$min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let take = match get_field(document, path) {
                None => true,
                Some(current) => compare_values(argument, current) == wanted,
            };
            if take {
                set_field(document, path, argument.clone())?;
            }
        }
        "$rename" => {
            let target = argument.as_str().ok_or_else(|| {
                StoreError::InvalidModifier(format!("$rename target for '{path}' must be a string"))
            })?;
            if touches_id(target) {
                return Err(StoreError::ImmutableField(target.to_string()));
            }
            if let Some(value) = remove_field(document, path) {
                set_field(document, target, value)?;
            }
        }
        "$push" => {
            let items = each_items(argument);
            let mut array = current_array(document, operator, path)?;
            array.extend(items);
            set_field(document, path, Value::Array(array))?;
        }
        "$addToSet" => {
            let items = each_items(argument);
            let mut array = current_array(document, operator, path)?;
            for item in items {
                if !array.iter().any(|existing| values_equal(existing, &item)) {
                    array.push(item);
                }
            }
            set_field(document, path, Value::Array(array))?;
        }
        "$pull" => {
            let Some(Value::Array(items)) = get_field(document, path) else {
                return Ok(());
            };
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                if !pull_matches(item, argument)? {
                    kept.push(item.clone());
                }
            }
            set_field(document, path, Value::Array(kept))?;
        }
        "$pop" => {
            let Some(Value::Array(items)) = get_field(document, path) else {
                return Ok(());
            };
            let mut items = items.clone();
            match argument.as_i64() {
                Some(1) => {
                    items.pop();
                }
                Some(-1) => {
                    if !items.is_empty() {
                        items.remove(0);
                    }
                }
                _ => {
                    return Err(StoreError::InvalidModifier(format!(
                        "$pop for '{path}' expects 1 or -1"
                    )))
                }
            }
            set_field(document, path, Value::Array(items))?;
        }
        other => return Err(StoreError::UnsupportedOperator(other.to_string())),
    }
    Ok(())
}

fn expect_number<'a>(operator: &str, path: &str, argument: &'a Value) -> StoreResult<&'a Number> {
    match argument {
        Value::Number(number) => Ok(number),
        _ => Err(StoreError::InvalidModifier(format!(
            "{operator} for '{path}' expects a number"
        ))),
    }
}

fn non_numeric(operator: &str, path: &str) -> StoreError {
    StoreError::InvalidModifier(format!("{operator} applied to non-numeric field '{path}'"))
}

/// Combine two numbers, staying integral while both are integers and the
/// result fits.
fn combine(
    a: &Number,
    b: &Number,
    integral: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = integral(x, y) {
            return Value::from(result);
        }
    }
    let x = a.as_f64().unwrap_or(0.0);
    let y = b.as_f64().unwrap_or(0.0);
    Number::from_f64(float(x, y)).map(Value::Number).unwrap_or(Value::Null)
}

fn each_items(argument: &Value) -> Vec<Value> {
    match argument {
        Value::Object(map) if map.len() == 1 => match map.get("$each") {
            Some(Value::Array(items)) => items.clone(),
            _ => vec![argument.clone()],
        },
        _ => vec![argument.clone()],
    }
}

fn current_array(document: &Document, operator: &str, path: &str) -> StoreResult<Vec<Value>> {
    match get_field(document, path) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(StoreError::InvalidModifier(format!(
            "{operator} applied to non-array field '{path}'"
        ))),
    }
}

fn pull_matches(item: &Value, condition: &Value) -> StoreResult<bool> {
    match (item, condition) {
        (Value::Object(element), Value::Object(query))
            if !query.keys().any(|key| key.starts_with('$')) =>
        {
            matches(element, query)
        }
        _ => condition_matches(&[Some(item)], condition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpatch_types::doc;
    use serde_json::json;

    fn user() -> Document {
        doc! {
            "_id": 1,
            "name": "user_1",
            "age": 31,
            "tags": ["a", "b"],
            "location": { "city": "Aarhus" }
        }
    }

    fn apply(modifier: Value) -> StoreResult<Document> {
        let Value::Object(modifier) = modifier else {
            panic!("modifier must be an object");
        };
        apply_modifier(&user(), &modifier)
    }

    #[test]
    fn set_and_unset() {
        let doc = apply(json!({ "$set": { "location.postcode": 8000 }, "$unset": { "age": 1 } })).unwrap();
        assert_eq!(doc["location"], json!({ "city": "Aarhus", "postcode": 8000 }));
        assert!(doc.get("age").is_none());
    }

    #[test]
    fn inc_and_mul() {
        let doc = apply(json!({ "$inc": { "age": 1, "visits": 2 } })).unwrap();
        assert_eq!(doc["age"], json!(32));
        assert_eq!(doc["visits"], json!(2));

        let doc = apply(json!({ "$mul": { "age": 0.5, "missing": 3 } })).unwrap();
        assert_eq!(doc["age"], json!(15.5));
        assert_eq!(doc["missing"], json!(0));

        assert!(matches!(
            apply(json!({ "$inc": { "name": 1 } })),
            Err(StoreError::InvalidModifier(_))
        ));
    }

    #[test]
    fn min_and_max() {
        let doc = apply(json!({ "$min": { "age": 20 }, "$max": { "score": 5 } })).unwrap();
        assert_eq!(doc["age"], json!(20));
        assert_eq!(doc["score"], json!(5));
        let doc = apply(json!({ "$min": { "age": 40 } })).unwrap();
        assert_eq!(doc["age"], json!(31));
    }

    #[test]
    fn rename_moves_value() {
        let doc = apply(json!({ "$rename": { "name": "username" } })).unwrap();
        assert_eq!(doc["username"], json!("user_1"));
        assert!(doc.get("name").is_none());
        let doc = apply(json!({ "$rename": { "missing": "other" } })).unwrap();
        assert!(doc.get("other").is_none());
    }

    #[test]
    fn array_operators() {
        let doc = apply(json!({ "$push": { "tags": { "$each": ["c", "a"] } } })).unwrap();
        assert_eq!(doc["tags"], json!(["a", "b", "c", "a"]));

        let doc = apply(json!({ "$addToSet": { "tags": { "$each": ["c", "a"] } } })).unwrap();
        assert_eq!(doc["tags"], json!(["a", "b", "c"]));

        let doc = apply(json!({ "$pull": { "tags": "a" } })).unwrap();
        assert_eq!(doc["tags"], json!(["b"]));

        let doc = apply(json!({ "$pop": { "tags": -1 } })).unwrap();
        assert_eq!(doc["tags"], json!(["b"]));

        let doc = apply(json!({ "$push": { "albums": { "title": "x" } } })).unwrap();
        assert_eq!(doc["albums"], json!([{ "title": "x" }]));

        assert!(apply(json!({ "$push": { "name": "x" } })).is_err());
    }

    #[test]
    fn pull_with_conditions() {
        let base = doc! { "_id": 1, "scores": [1, 5, 9], "albums": [{ "t": "x" }, { "t": "y" }] };
        let doc = apply_modifier(&base, &doc! { "$pull": { "scores": { "$gte": 5 } } }).unwrap();
        assert_eq!(doc["scores"], json!([1]));
        let doc = apply_modifier(&base, &doc! { "$pull": { "albums": { "t": "x" } } }).unwrap();
        assert_eq!(doc["albums"], json!([{ "t": "y" }]));
    }

    #[test]
    fn replacement_keeps_id() {
        let doc = apply(json!({ "username": "user_1" })).unwrap();
        assert_eq!(Value::Object(doc), json!({ "_id": 1, "username": "user_1" }));
        let doc = apply(json!({ "_id": 1, "name": "x" })).unwrap();
        assert_eq!(doc["_id"], json!(1));
    }

    #[test]
    fn id_is_immutable() {
        assert!(matches!(
            apply(json!({ "$set": { "_id": 2 } })),
            Err(StoreError::ImmutableField(_))
        ));
        assert!(apply(json!({ "$set": { "_id": 1 } })).is_ok());
        assert!(matches!(
            apply(json!({ "_id": 2, "name": "x" })),
            Err(StoreError::ImmutableField(_))
        ));
        assert!(matches!(
            apply(json!({ "$rename": { "name": "_id" } })),
            Err(StoreError::ImmutableField(_))
        ));
    }

    #[test]
    fn malformed_modifiers() {
        assert!(matches!(
            apply(json!({ "$set": { "a": 1 }, "b": 2 })),
            Err(StoreError::InvalidModifier(_))
        ));
        assert!(matches!(
            apply(json!({ "$set": 1 })),
            Err(StoreError::InvalidModifier(_))
        ));
        assert!(matches!(
            apply(json!({ "$currentDate": { "a": true } })),
            Err(StoreError::UnsupportedOperator(_))
        ));
    }
}
