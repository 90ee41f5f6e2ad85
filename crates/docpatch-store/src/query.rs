//! Query evaluation.
//!
//! A query is a document whose top-level entries are implicitly and-ed.
//! Field entries address values by dot path; when a path crosses an array,
//! every element is tried. A field condition is either a plain value
//! (equality) or an object of `$` operators.

use std::cmp::Ordering;

use serde_json::Value;

use docpatch_types::{canonical_document, compare_values, is_typed_leaf, values_equal, Document};

use crate::error::{StoreError, StoreResult};

/// Top-level operator comparing the whole document, canonicalized, with a
/// literal string.
pub const CANONICAL_OPERATOR: &str = "$canonical";

/// Whether `document` satisfies `query`.
pub fn matches(document: &Document, query: &Document) -> StoreResult<bool> {
    for (key, condition) in query {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(document, key, condition)?,
            "$nor" => !any_clause(document, key, condition)?,
            CANONICAL_OPERATOR => {
                let literal = condition.as_str().ok_or_else(|| {
                    StoreError::InvalidQuery(format!("{CANONICAL_OPERATOR} expects a string"))
                })?;
                canonical_document(document) == literal
            }
            operator if operator.starts_with('$') => {
                return Err(StoreError::UnsupportedOperator(operator.to_string()));
            }
            field => {
                let candidates = lookup(document, field);
                condition_matches(&candidates, condition)?
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, condition: &'a Value) -> StoreResult<Vec<&'a Document>> {
    let Value::Array(items) = condition else {
        return Err(StoreError::InvalidQuery(format!("{operator} expects an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(clause) => Ok(clause),
            _ => Err(StoreError::InvalidQuery(format!(
                "{operator} clauses must be documents"
            ))),
        })
        .collect()
}

fn any_clause(document: &Document, operator: &str, condition: &Value) -> StoreResult<bool> {
    for clause in clauses(operator, condition)? {
        if matches(document, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Values reachable at a dot path. `None` entries stand for a missing field.
pub(crate) fn lookup<'a>(document: &'a Document, field: &str) -> Vec<Option<&'a Value>> {
    let parts: Vec<&str> = field.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = parts.split_first() {
        descend(document.get(*head), rest, &mut out);
    }
    out
}

fn descend<'a>(value: Option<&'a Value>, parts: &[&str], out: &mut Vec<Option<&'a Value>>) {
    let Some((head, rest)) = parts.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Some(Value::Object(map)) => descend(map.get(*head), rest, out),
        Some(Value::Array(items)) => {
            let before = out.len();
            if let Ok(index) = head.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    descend(Some(item), rest, out);
                }
            }
            for item in items.iter().filter(|item| item.is_object()) {
                descend(Some(item), parts, out);
            }
            if out.len() == before {
                out.push(None);
            }
        }
        _ => out.push(None),
    }
}

/// Present candidates, with arrays also contributing their elements.
fn expanded<'a>(candidates: &'a [Option<&'a Value>]) -> impl Iterator<Item = &'a Value> + 'a {
    candidates.iter().flatten().copied().flat_map(|value: &'a Value| {
        let elements: &'a [Value] = match value {
            Value::Array(items) => items.as_slice(),
            _ => &[],
        };
        std::iter::once(value).chain(elements.iter())
    })
}

fn is_operator_expression(condition: &Value) -> bool {
    match condition {
        Value::Object(map) => {
            !map.is_empty()
                && !is_typed_leaf(condition)
                && map.keys().all(|key| key.starts_with('$'))
        }
        _ => false,
    }
}

/// Evaluate a field condition against the candidates found at its path.
pub(crate) fn condition_matches(
    candidates: &[Option<&Value>],
    condition: &Value,
) -> StoreResult<bool> {
    if !is_operator_expression(condition) {
        return Ok(equals(candidates, condition));
    }
    let Value::Object(operators) = condition else {
        return Ok(false);
    };
    for (operator, argument) in operators {
        if !operator_matches(candidates, operator, argument)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals(candidates: &[Option<&Value>], target: &Value) -> bool {
    if target.is_null() && candidates.iter().any(Option::is_none) {
        return true;
    }
    expanded(candidates).any(|value| values_equal(value, target))
}

fn same_kind(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn compares(candidates: &[Option<&Value>], target: &Value, accept: fn(Ordering) -> bool) -> bool {
    expanded(candidates)
        .filter(|value| same_kind(value, target))
        .any(|value| accept(compare_values(value, target)))
}

fn operator_matches(
    candidates: &[Option<&Value>],
    operator: &str,
    argument: &Value,
) -> StoreResult<bool> {
    let result = match operator {
        "$eq" => equals(candidates, argument),
        "$ne" => !equals(candidates, argument),
        "$gt" => compares(candidates, argument, Ordering::is_gt),
        "$gte" => compares(candidates, argument, Ordering::is_ge),
        "$lt" => compares(candidates, argument, Ordering::is_lt),
        "$lte" => compares(candidates, argument, Ordering::is_le),
        "$in" => in_list(candidates, operator, argument)?,
        "$nin" => !in_list(candidates, operator, argument)?,
        "$exists" => {
            let wanted = argument.as_bool().ok_or_else(|| {
                StoreError::InvalidQuery("$exists expects a boolean".to_string())
            })?;
            candidates.iter().any(Option::is_some) == wanted
        }
        "$size" => {
            let size = argument.as_u64().ok_or_else(|| {
                StoreError::InvalidQuery("$size expects a non-negative integer".to_string())
            })?;
            candidates.iter().flatten().any(|value| {
                matches!(value, Value::Array(items) if items.len() as u64 == size)
            })
        }
        "$not" => {
            if !is_operator_expression(argument) {
                return Err(StoreError::InvalidQuery(
                    "$not expects an operator expression".to_string(),
                ));
            }
            !condition_matches(candidates, argument)?
        }
        other => return Err(StoreError::UnsupportedOperator(other.to_string())),
    };
    Ok(result)
}

fn in_list(candidates: &[Option<&Value>], operator: &str, argument: &Value) -> StoreResult<bool> {
    let Value::Array(options) = argument else {
        return Err(StoreError::InvalidQuery(format!("{operator} expects an array")));
    };
    Ok(options.iter().any(|option| equals(candidates, option)))
}
