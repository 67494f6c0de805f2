//! Cell value helpers shared by routing and merging.
//!
//! Values are carried as `serde_json::Value` end to end:
//! - `values_equal`: equality with numbers compared numerically
//! - `compare_values`: total order over non-null values
//! - `hash_value`: a hash consistent with `values_equal`
//! - `as_i64` / `as_f64`: numeric coercion used by the algorithms

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde_json::{Number, Value};

use crate::error::{ShardingError, ShardingResult};

/// Exact integer view of a number, including integral floats such as `4.0`.
fn integral(n: &Number) -> Option<i128> {
    if let Some(i) = n.as_i64() {
        return Some(i as i128);
    }
    if let Some(u) = n.as_u64() {
        return Some(u as i128);
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < 1e38)
        .map(|f| f as i128)
}

/// Compare two values for equality.
///
/// Integral numbers compare exactly, so `1` and `1.0` match but
/// `2^53` and `2^53 + 1` do not. Other numbers compare as f64.
#[inline]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (integral(a), integral(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Natural ordering of two values.
///
/// NULL sorts below everything; callers that need a different NULL
/// placement handle it before calling this.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (integral(a), integral(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let a_f64 = a.as_f64().unwrap_or(0.0);
                let b_f64 = b.as_f64().unwrap_or(0.0);
                a_f64.partial_cmp(&b_f64).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b) {
                let ord = compare_values(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(a), Value::Object(b)) => Value::Object(a.clone())
            .to_string()
            .cmp(&Value::Object(b.clone()).to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Feed a value into a hasher such that `values_equal(a, b)` implies equal hashes.
pub fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    type_rank(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::Number(n) => match integral(n) {
            Some(i) => i.hash(state),
            None => n.as_f64().unwrap_or(0.0).to_bits().hash(state),
        },
        Value::String(s) => s.hash(state),
        Value::Array(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(_) => value.to_string().hash(state),
    }
}

/// Integer view of a value; numeric strings are accepted.
pub fn as_i64(value: &Value) -> ShardingResult<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| ShardingError::Algorithm(format!("'{}' is not an integer", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| ShardingError::Algorithm(format!("'{}' is not an integer", s))),
        other => Err(ShardingError::Algorithm(format!(
            "'{}' is not an integer",
            other
        ))),
    }
}

/// Floating point view of a value; numeric strings are accepted.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Render a value for use inside a physical name (`t_order_` + `1`).
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Create a JSON number from an f64, falling back to 0 for non-finite input.
#[inline]
pub fn number_from_f64(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        hash_value(value, &mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_values_equal() {
        assert!(values_equal(&json!(1), &json!(1)));
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!("a"), &json!("a")));
        assert!(values_equal(&Value::Null, &Value::Null));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare_values(&json!("a"), &json!("b")), Ordering::Less);
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(9), &json!("1")), Ordering::Less);
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let a = json!(9_007_199_254_740_993_i64);
        let b = json!(9_007_199_254_740_992_i64);
        assert_eq!(compare_values(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_hash_consistent_with_equality() {
        assert_eq!(hash_of(&json!(1)), hash_of(&json!(1.0)));
        assert_eq!(hash_of(&json!("x")), hash_of(&json!("x")));
        assert_ne!(hash_of(&json!("x")), hash_of(&json!("y")));
    }

    #[test]
    fn test_large_integers_stay_distinct() {
        let a = json!(9_007_199_254_740_993_i64);
        let b = json!(9_007_199_254_740_992_i64);
        assert!(!values_equal(&a, &b));
        assert_ne!(hash_of(&a), hash_of(&b));
        assert!(values_equal(&b, &json!(9_007_199_254_740_992.0)));
        assert_eq!(hash_of(&b), hash_of(&json!(9_007_199_254_740_992.0)));

        let big = json!(u64::MAX);
        assert!(!values_equal(&big, &json!(u64::MAX - 1)));
        assert_eq!(compare_values(&big, &json!(i64::MAX)), Ordering::Greater);
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(as_i64(&json!(7)).unwrap(), 7);
        assert_eq!(as_i64(&json!("12")).unwrap(), 12);
        assert_eq!(as_i64(&json!(4.0)).unwrap(), 4);
        assert!(as_i64(&json!("abc")).is_err());
        assert!(as_i64(&json!(1.5)).is_err());
    }
}
