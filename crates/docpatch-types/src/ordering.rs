//! Total ordering over document values.
//!
//! Values of different kinds order by type bracket
//! (null < numbers < strings < objects < arrays < booleans); within a
//! bracket they order naturally. Numbers compare by numeric value, so `1`
//! and `1.0` are equal.

use std::cmp::Ordering;

use serde_json::{Number, Value};

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

/// Compare two values under the store's total ordering.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(xs), Value::Array(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                let ord = compare_values(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        (Value::Object(xs), Value::Object(ys)) => {
            let mut xk: Vec<_> = xs.iter().collect();
            let mut yk: Vec<_> = ys.iter().collect();
            xk.sort_by(|l, r| l.0.cmp(r.0));
            yk.sort_by(|l, r| l.0.cmp(r.0));
            for ((xkey, xval), (ykey, yval)) in xk.iter().zip(&yk) {
                let ord = xkey.cmp(ykey).then_with(|| compare_values(xval, yval));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xk.len().cmp(&yk.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Structural equality under the store's ordering (numeric-aware).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// A value usable as an ordered map key.
#[derive(Clone, Debug)]
pub struct OrderedValue(pub Value);

impl OrderedValue {
    /// The wrapped value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwraps the value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        values_equal(&self.0, &other.0)
    }
}

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_numerically() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(-1), &json!(u64::MAX)), Ordering::Less);
    }

    #[test]
    fn type_brackets_order() {
        let ordered = [
            json!(null),
            json!(5),
            json!("a"),
            json!({ "a": 1 }),
            json!([1]),
            json!(false),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less, "{pair:?}");
        }
    }

    #[test]
    fn arrays_are_lexicographic() {
        assert_eq!(compare_values(&json!([1, 2]), &json!([1, 3])), Ordering::Less);
        assert_eq!(compare_values(&json!([1]), &json!([1, 0])), Ordering::Less);
    }

    #[test]
    fn ordered_value_sorts_ids() {
        let mut ids = vec![
            OrderedValue(json!("b")),
            OrderedValue(json!(3)),
            OrderedValue(json!("a")),
            OrderedValue(json!(1)),
        ];
        ids.sort();
        let sorted: Vec<Value> = ids.into_iter().map(OrderedValue::into_value).collect();
        assert_eq!(sorted, vec![json!(1), json!(3), json!("a"), json!("b")]);
    }

    proptest! {
        #[test]
        fn compare_is_antisymmetric(a in -1000i64..1000, b in -1000i64..1000) {
            let (x, y) = (json!(a), json!(b));
            prop_assert_eq!(compare_values(&x, &y), compare_values(&y, &x).reverse());
        }
    }
}
