//! Value type definitions for Strata.
//!
//! This module defines the `Value` enum which represents one column of an index key.

use crate::types::DataType;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A value that can be stored in an index key column.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// String value
    String(String),
    /// DateTime stored as Unix timestamp in milliseconds
    DateTime(i64),
}

impl Value {
    /// Returns the data type of this value, or None if it's Null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::String(_) => Some(DataType::String),
            Value::DateTime(_) => Some(DataType::DateTime),
        }
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i64 value if this is an Int64, None otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the f64 value if this is a Float64, None otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the datetime timestamp if this is a DateTime, None otherwise.
    pub fn as_datetime(&self) -> Option<i64> {
        match self {
            Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }
}

/// Index-key equality: floats compare by bit pattern (all NaNs are equal, `0.0 != -0.0`),
/// so two equal values always serialize to the same key bytes.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => float_key_eq(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => canonical_float_bits(*f).hash(state),
            Value::String(s) => s.hash(state),
            Value::DateTime(d) => d.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "dt'{}'", v),
        }
    }
}

/// Returns the bit pattern used for keys, collapsing every NaN to one representation.
#[inline]
pub fn canonical_float_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

/// Compares two floats the way index keys compare them.
#[inline]
pub fn float_key_eq(a: f64, b: f64) -> bool {
    canonical_float_bits(a) == canonical_float_bits(b)
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_check() {
        let v = Value::Int64(42);
        assert_eq!(v.data_type(), Some(DataType::Int64));
    }

    #[test]
    fn test_value_null() {
        let v = Value::Null;
        assert_eq!(v.data_type(), None);
        assert!(v.is_null());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Int64(100).as_i64(), Some(100));
        assert_eq!(Value::Float64(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::DateTime(1234567890).as_datetime(), Some(1234567890));
        assert_eq!(Value::Int64(1).as_str(), None);
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Int64(42), Value::Int64(42));
        assert_ne!(Value::Int64(42), Value::DateTime(42));
        assert_eq!(Value::Null, Value::Null);
        assert_eq!(Value::String("test".into()), Value::String("test".into()));
    }

    #[test]
    fn test_float_key_equality() {
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(-f64::NAN));
        assert_ne!(Value::Float64(0.0), Value::Float64(-0.0));
        assert_eq!(Value::Float64(1.5), Value::Float64(1.5));
    }

    #[test]
    fn test_value_from_impls() {
        let v: Value = 42i64.into();
        assert_eq!(v.as_i64(), Some(42));

        let v: Value = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));

        let v: Value = None::<i64>.into();
        assert!(v.is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int64(7).to_string(), "7");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::String("ab".into()).to_string(), "ab");
    }
}
