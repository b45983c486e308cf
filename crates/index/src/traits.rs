//! Index trait definitions for Strata.
//!
//! `KeyType` and `LeafType` describe how keys and stored values are laid out on
//! disk; `Index` is the object-safe surface the table layer drives.

use crate::stats::StatsReport;
use std::fmt;
use std::io::Read;
use strata_core::{DataType, Result, Value};

/// Serialization and equality for the keys of a trie.
pub trait KeyType {
    /// The in-memory key.
    type Key: Clone + fmt::Debug;

    /// Bytes that address the key in the trie, one byte per level.
    fn to_bytes(&self, key: &Self::Key) -> Vec<u8>;

    /// Writes the stored form of the key, including its type marker.
    fn write(&self, key: &Self::Key, out: &mut Vec<u8>);

    /// Reads a key written by [`KeyType::write`].
    fn read(&self, reader: &mut dyn Read) -> Result<Self::Key>;

    /// Size in bytes of the stored form, including the type marker.
    fn size(&self, key: &Self::Key) -> u64;

    /// Type-aware key equality.
    fn keys_equal(&self, a: &Self::Key, b: &Self::Key) -> bool;

    /// Rejects keys this type cannot store.
    fn validate(&self, _key: &Self::Key) -> Result<()> {
        Ok(())
    }
}

/// Serialization for the values stored in trie leaves.
pub trait LeafType {
    /// The in-memory value.
    type Value: Clone + fmt::Debug;

    fn write(&self, value: &Self::Value, out: &mut Vec<u8>);

    fn read(&self, reader: &mut dyn Read) -> Result<Self::Value>;

    fn size(&self, value: &Self::Value) -> u64;
}

/// Table-facing index contract.
///
/// Keys are one `Value` per indexed column; values are row-file offsets.
/// Every mutation is staged until `commit` and discarded by `rollback`.
pub trait Index {
    /// Returns every value stored under the key, in insertion order.
    fn get(&mut self, key: &[Value]) -> Result<Vec<i64>>;

    /// Returns true if at least one value is stored under the key.
    fn contains(&mut self, key: &[Value]) -> Result<bool>;

    /// Adds a value under the key.
    /// Unique indexes fail with a duplicate key error if the key exists.
    fn put(&mut self, key: &[Value], value: i64) -> Result<()>;

    /// Removes the key and all its values.
    fn delete(&mut self, key: &[Value]) -> Result<bool>;

    /// Removes one occurrence of `value` under the key.
    fn delete_value(&mut self, key: &[Value], value: i64) -> Result<bool>;

    /// Durably flushes staged mutations.
    fn commit(&mut self) -> Result<()>;

    /// Discards staged mutations.
    fn rollback(&mut self);

    /// File sizes and node counts for monitoring.
    fn stats(&self) -> Result<StatsReport>;

    fn close(&mut self) -> Result<()>;

    fn reopen(&mut self) -> Result<()>;

    /// Deletes the backing files. The index cannot be reopened afterwards.
    fn drop_index(&mut self) -> Result<()>;

    fn is_unique(&self) -> bool;

    /// Types of the indexed columns, in key order.
    fn key_types(&self) -> &[DataType];
}
