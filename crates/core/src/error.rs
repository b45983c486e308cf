//! Error types for Strata.

use crate::types::DataType;
use std::fmt;
use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for index operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An insert-only index already holds the key.
    #[error("Key '{key}' already present in index")]
    DuplicateKey { key: String },
    /// An on-disk or in-memory structural invariant is broken.
    #[error("Inconsistent index state: {message}")]
    Inconsistent { message: String },
    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Type mismatch error.
    #[error("Type mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch {
        expected: DataType,
        got: Option<DataType>,
    },
    /// Invalid operation.
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
    /// Waiting for a lock was cancelled.
    #[error("Cancelled: {message}")]
    Cancelled { message: String },
}

/// How the enclosing transaction has to treat an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Roll back the transaction and report the error to the user.
    User,
    /// Roll back and reconcile from durable state; the in-memory cache may be corrupt.
    Crash,
}

impl Error {
    /// Creates a duplicate key error.
    pub fn duplicate_key(key: impl fmt::Debug) -> Self {
        Error::DuplicateKey {
            key: format!("{:?}", key),
        }
    }

    /// Creates a structural-invariant error.
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Error::Inconsistent {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: Option<DataType>) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Error::Cancelled {
            message: message.into(),
        }
    }

    /// Classifies this error for the transaction layer.
    pub fn severity(&self) -> Severity {
        match self {
            Error::Inconsistent { .. } | Error::Io(_) => Severity::Crash,
            Error::DuplicateKey { .. }
            | Error::TypeMismatch { .. }
            | Error::InvalidOperation { .. }
            | Error::Cancelled { .. } => Severity::User,
        }
    }

    /// Returns true if this is a duplicate key error.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::DuplicateKey { .. })
    }

    /// Returns true if this is a structural-invariant error.
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, Error::Inconsistent { .. })
    }
}
