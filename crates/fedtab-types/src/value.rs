//! Runtime value types exchanged across the engine boundary.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A runtime value carried through translation, filtering, and result rows.
///
/// This enum covers the scalar types a data source can expose. Values of
/// numerically compatible variants (`Int32`/`Int64`) compare equal when
/// their widened forms are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Timestamp as microseconds since Unix epoch.
    Timestamp(i64),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as i64, widening Int32.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Int32(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

/// Check if two values are equal, coercing compatible numeric widths.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int32(a), Value::Int32(b)) => a == b,
        (Value::Int64(a), Value::Int64(b)) => a == b,
        (Value::Int32(a), Value::Int64(b)) => i64::from(*a) == *b,
        (Value::Int64(a), Value::Int32(b)) => *a == i64::from(*b),
        (Value::Float64(a), Value::Float64(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bytes(a), Value::Bytes(b)) => a == b,
        (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
        _ => false,
    }
}

/// Compare two values, returning their ordering if comparable.
///
/// Nulls order before everything so sorted output is stable; values of
/// incompatible types are not comparable and yield `None`.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
        (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
        (Value::Int32(a), Value::Int64(b)) => Some(i64::from(*a).cmp(b)),
        (Value::Int64(a), Value::Int32(b)) => Some(a.cmp(&i64::from(*b))),
        (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_width_coercion() {
        assert!(values_equal(&Value::Int32(100), &Value::Int64(100)));
        assert!(values_equal(&Value::Int64(100), &Value::Int32(100)));
        assert!(!values_equal(&Value::Int32(100), &Value::Int64(101)));
    }

    #[test]
    fn test_incompatible_types_not_equal() {
        assert!(!values_equal(&Value::Int32(1), &Value::String("1".into())));
        assert!(!values_equal(&Value::Null, &Value::Int32(0)));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(
            compare_values(&Value::Int32(1), &Value::Int64(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&Value::String("a".into()), &Value::String("b".into())),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&Value::Int32(1), &Value::String("a".into())),
            None
        );
    }

    #[test]
    fn test_null_orders_first() {
        assert_eq!(
            compare_values(&Value::Null, &Value::Int32(-100)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&Value::Int32(-100), &Value::Null),
            Some(Ordering::Greater)
        );
    }
}
