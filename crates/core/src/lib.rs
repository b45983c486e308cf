//! Strata Core - Core types, errors and configuration for the Strata index engine.
//!
//! This crate provides the foundational types shared by the index and storage crates:
//!
//! - `DataType`: Column types that can participate in an index key
//! - `Value`: One column of an index key, with index-key equality
//! - `Config`: Engine configuration (data directory, commit durability, cache and lock tuning)
//! - `Error`: Error types for index operations, classified by `Severity`
//!
//! # Example
//!
//! ```rust
//! use strata_core::{Config, Error, Severity, Value};
//!
//! let config = Config::default().with_data_dir("/tmp/strata");
//! assert!(config.index_path("users", "email").ends_with("index/users.email"));
//!
//! let err = Error::duplicate_key(Value::Int64(7));
//! assert_eq!(err.severity(), Severity::User);
//! ```

mod config;
mod error;
mod types;
mod value;

pub use config::Config;
pub use error::{Error, Result, Severity};
pub use types::DataType;
pub use value::{canonical_float_bits, float_key_eq, Value};
