//! Data type definitions for Strata.
//!
//! This module defines the column types that can be used as index keys.

use serde::{Deserialize, Serialize};

/// Column data types that can participate in an index key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// String, stored as UTF-16 code units
    String,
    /// Date and time stored as Unix timestamp (milliseconds)
    DateTime,
}

impl DataType {
    /// Returns the encoded size of a non-null value of this type, if it is fixed.
    pub fn fixed_size(&self) -> Option<u64> {
        match self {
            DataType::Boolean => Some(1),
            DataType::Int64 | DataType::Float64 | DataType::DateTime => Some(8),
            DataType::String => None,
        }
    }

    /// Returns the SQL-facing name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Int64 => "integer",
            DataType::Float64 => "float",
            DataType::String => "varchar",
            DataType::DateTime => "timestamp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_equality() {
        assert_eq!(DataType::Int64, DataType::Int64);
        assert_ne!(DataType::Int64, DataType::DateTime);
    }

    #[test]
    fn test_fixed_size() {
        assert_eq!(DataType::Boolean.fixed_size(), Some(1));
        assert_eq!(DataType::Int64.fixed_size(), Some(8));
        assert_eq!(DataType::Float64.fixed_size(), Some(8));
        assert_eq!(DataType::DateTime.fixed_size(), Some(8));
        assert_eq!(DataType::String.fixed_size(), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(DataType::String.name(), "varchar");
        assert_eq!(DataType::Int64.name(), "integer");
    }
}
