//! Strata Storage - Concurrency control for Strata indexes.
//!
//! This crate provides:
//!
//! - `Resources`: the tables and indexed columns a transaction touches
//! - `LockManager`: all-or-nothing shared/exclusive locking with randomized retry
//! - `Transaction`: lock acquisition plus commit/rollback across participating indexes
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use strata_core::{Config, DataType, Value};
//! use strata_index::{Index, TableUniqueIndex};
//! use strata_storage::{LockManager, Resource, Resources, Transaction};
//!
//! let config = Config::default().with_data_dir("/tmp/strata");
//! let locks = Arc::new(LockManager::new());
//! locks.sync(&["users", "users.email"]);
//!
//! let mut email =
//!     TableUniqueIndex::open(&config, "users", "email", vec![DataType::String], false).unwrap();
//!
//! let resources = Resources::new()
//!     .with(Resource::write("users"))
//!     .with(Resource::write(Resource::index_id("users", "email")));
//! let tx = Transaction::begin(locks, resources, &config, &AtomicBool::new(false)).unwrap();
//! email.put(&[Value::String("a@example.com".into())], 1).unwrap();
//! let mut indexes: [&mut dyn Index; 1] = [&mut email];
//! tx.commit(&mut indexes).unwrap();
//! ```

pub mod lock;
pub mod resources;
pub mod transaction;

pub use lock::{LockManager, LockType};
pub use resources::{Resource, Resources};
pub use transaction::{Transaction, TransactionId, TransactionState};
