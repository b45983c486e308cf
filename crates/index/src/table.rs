//! Table-facing indexes over `Value` keys.
//!
//! A table opens one `TableUniqueIndex` or `TableMultiIndex` per indexed column
//! set and drives it through the [`Index`] trait. Single-column keys of NULL are
//! never stored: lookups miss and inserts are rejected.

use crate::bindings::{
    DoubleIndex, DoubleMultiIndex, IdIndex, LongIndex, LongMultiIndex, MultiColumnIndex,
    MultiColumnMultiIndex, StringIndex, StringMultiIndex,
};
use crate::stats::StatsReport;
use crate::traits::Index;
use std::fs;
use strata_core::{Config, DataType, Error, Result, Value};
use tracing::info;

fn single<'a>(key: &'a [Value], expected: DataType) -> Result<Option<&'a Value>> {
    match key {
        [Value::Null] => Ok(None),
        [value] if value.data_type() == Some(expected) => Ok(Some(value)),
        [value] => Err(Error::type_mismatch(expected, value.data_type())),
        _ => Err(Error::invalid_operation(format!(
            "expected 1 key column, got {}",
            key.len()
        ))),
    }
}

fn long_key(key: &[Value], expected: DataType) -> Result<Option<i64>> {
    Ok(single(key, expected)?.and_then(|value| match value {
        Value::Int64(v) | Value::DateTime(v) => Some(*v),
        _ => None,
    }))
}

fn string_key(key: &[Value]) -> Result<Option<String>> {
    Ok(single(key, DataType::String)?.and_then(|value| value.as_str().map(str::to_string)))
}

fn double_key(key: &[Value]) -> Result<Option<f64>> {
    Ok(single(key, DataType::Float64)?.and_then(Value::as_f64))
}

fn null_key(types: &[DataType]) -> Error {
    Error::invalid_operation(format!(
        "NULL cannot be stored in a single-column {} index",
        types.first().map(DataType::name).unwrap_or("empty")
    ))
}

/// Evaluates `$body` with `$index` bound to whichever engine backs `$kind`.
macro_rules! each_engine {
    ($Kind:ident { $($variant:ident),+ }, $kind:expr, |$index:ident| $body:expr) => {
        match $kind {
            $($Kind::$variant($index) => $body,)+
        }
    };
}

macro_rules! each_unique {
    ($kind:expr, |$index:ident| $body:expr) => {
        each_engine!(UniqueKind { Long, String, Double, MultiColumn, Id }, $kind, |$index| $body)
    };
}

macro_rules! each_multi {
    ($kind:expr, |$index:ident| $body:expr) => {
        each_engine!(MultiKind { Long, String, Double, MultiColumn }, $kind, |$index| $body)
    };
}

/// Decodes `$key` for the trie engine behind `$kind` and evaluates `$hit` with
/// `$k` bound to the typed key. A single-column NULL key evaluates `$miss`.
/// Engines that are not tries are matched by the trailing arms.
macro_rules! with_trie_key {
    (
        $Kind:ident, $kind:expr, $column_type:expr, $key:expr,
        |$index:ident, $k:ident| $hit:expr, $miss:expr
        $(, $extra:pat => $extra_body:expr)*
    ) => {
        match $kind {
            $Kind::Long($index) => match long_key($key, $column_type)? {
                Some($k) => $hit,
                None => $miss,
            },
            $Kind::String($index) => match string_key($key)? {
                Some($k) => $hit,
                None => $miss,
            },
            $Kind::Double($index) => match double_key($key)? {
                Some($k) => $hit,
                None => $miss,
            },
            $Kind::MultiColumn($index) => {
                let $k = $key.to_vec();
                $hit
            }
            $($extra => $extra_body,)*
        }
    };
}

enum UniqueKind {
    Long(LongIndex),
    String(StringIndex),
    Double(DoubleIndex),
    MultiColumn(MultiColumnIndex),
    Id(IdIndex),
}

/// Unique index of a table.
pub struct TableUniqueIndex {
    name: String,
    key_types: Vec<DataType>,
    kind: UniqueKind,
}

impl TableUniqueIndex {
    /// Opens `<index_dir>/<table>.<name>`. Id columns get a dense index.
    pub fn open(
        config: &Config,
        table: &str,
        name: &str,
        key_types: Vec<DataType>,
        id_column: bool,
    ) -> Result<Self> {
        fs::create_dir_all(config.index_dir())?;
        let path = config.index_path(table, name);
        let kind = match key_types.as_slice() {
            [DataType::Int64] if id_column => UniqueKind::Id(IdIndex::open(&path, config)?),
            _ if id_column => {
                return Err(Error::invalid_operation(format!(
                    "id index {}.{} must have a single integer column",
                    table, name
                )))
            }
            [DataType::Int64] | [DataType::DateTime] => {
                UniqueKind::Long(LongIndex::create(&path, config)?)
            }
            [DataType::String] => UniqueKind::String(StringIndex::create(&path, config)?),
            [DataType::Float64] => UniqueKind::Double(DoubleIndex::create(&path, config)?),
            [] => return Err(Error::invalid_operation("index without key columns")),
            types => UniqueKind::MultiColumn(MultiColumnIndex::with_columns(
                &path,
                types.to_vec(),
                config,
            )?),
        };
        info!(path = %path.display(), ?key_types, "opened unique index");
        Ok(Self {
            name: format!("{}.{}", table, name),
            key_types,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The single value stored under `key`.
    pub fn get_unique(&mut self, key: &[Value]) -> Result<Option<i64>> {
        with_trie_key!(
            UniqueKind, &mut self.kind, self.key_types[0], key,
            |index, k| index.get(&k),
            Ok(None),
            UniqueKind::Id(index) => match long_key(key, DataType::Int64)? {
                Some(k) => index.get(k),
                None => Ok(None),
            }
        )
    }

    /// Highest id tracked by a dense id index.
    pub fn last_id(&self) -> Option<i64> {
        match &self.kind {
            UniqueKind::Id(index) => Some(index.last_id()),
            _ => None,
        }
    }
}

impl Index for TableUniqueIndex {
    fn get(&mut self, key: &[Value]) -> Result<Vec<i64>> {
        Ok(self.get_unique(key)?.into_iter().collect())
    }

    fn contains(&mut self, key: &[Value]) -> Result<bool> {
        Ok(self.get_unique(key)?.is_some())
    }

    fn put(&mut self, key: &[Value], value: i64) -> Result<()> {
        with_trie_key!(
            UniqueKind, &mut self.kind, self.key_types[0], key,
            |index, k| index.put(k, value),
            Err(null_key(&self.key_types)),
            UniqueKind::Id(index) => match long_key(key, DataType::Int64)? {
                Some(k) => index.put(k, value),
                None => Err(null_key(&self.key_types)),
            }
        )
    }

    fn delete(&mut self, key: &[Value]) -> Result<bool> {
        with_trie_key!(
            UniqueKind, &mut self.kind, self.key_types[0], key,
            |index, k| index.delete(&k),
            Ok(false),
            UniqueKind::Id(index) => match long_key(key, DataType::Int64)? {
                Some(k) => index.delete(k),
                None => Ok(false),
            }
        )
    }

    fn delete_value(&mut self, key: &[Value], value: i64) -> Result<bool> {
        if self.get_unique(key)? == Some(value) {
            self.delete(key)
        } else {
            Ok(false)
        }
    }

    fn commit(&mut self) -> Result<()> {
        each_unique!(&mut self.kind, |index| index.commit())
    }

    fn rollback(&mut self) {
        each_unique!(&mut self.kind, |index| index.rollback())
    }

    fn stats(&self) -> Result<StatsReport> {
        let stats = each_unique!(&self.kind, |index| index.stats()?);
        Ok(StatsReport::Unique(stats))
    }

    fn close(&mut self) -> Result<()> {
        each_unique!(&mut self.kind, |index| index.close());
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        each_unique!(&mut self.kind, |index| index.reopen())
    }

    fn drop_index(&mut self) -> Result<()> {
        each_unique!(&mut self.kind, |index| index.drop_index())
    }

    fn is_unique(&self) -> bool {
        true
    }

    fn key_types(&self) -> &[DataType] {
        &self.key_types
    }
}

enum MultiKind {
    Long(LongMultiIndex),
    String(StringMultiIndex),
    Double(DoubleMultiIndex),
    MultiColumn(MultiColumnMultiIndex),
}

/// Non-unique index of a table.
pub struct TableMultiIndex {
    name: String,
    key_types: Vec<DataType>,
    kind: MultiKind,
}

impl TableMultiIndex {
    /// Opens `<index_dir>/<table>.<name>#index` and its `#chain` file.
    pub fn open(config: &Config, table: &str, name: &str, key_types: Vec<DataType>) -> Result<Self> {
        fs::create_dir_all(config.index_dir())?;
        let base = config.index_path(table, name);
        let kind = match key_types.as_slice() {
            [DataType::Int64] | [DataType::DateTime] => {
                MultiKind::Long(LongMultiIndex::create(&base, config)?)
            }
            [DataType::String] => MultiKind::String(StringMultiIndex::create(&base, config)?),
            [DataType::Float64] => MultiKind::Double(DoubleMultiIndex::create(&base, config)?),
            [] => return Err(Error::invalid_operation("index without key columns")),
            types => MultiKind::MultiColumn(MultiColumnMultiIndex::with_columns(
                &base,
                types.to_vec(),
                config,
            )?),
        };
        info!(path = %base.display(), ?key_types, "opened multi index");
        Ok(Self {
            name: format!("{}.{}", table, name),
            key_types,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Index for TableMultiIndex {
    fn get(&mut self, key: &[Value]) -> Result<Vec<i64>> {
        with_trie_key!(
            MultiKind, &mut self.kind, self.key_types[0], key,
            |index, k| index.get(&k),
            Ok(Vec::new())
        )
    }

    fn contains(&mut self, key: &[Value]) -> Result<bool> {
        Ok(!self.get(key)?.is_empty())
    }

    fn put(&mut self, key: &[Value], value: i64) -> Result<()> {
        with_trie_key!(
            MultiKind, &mut self.kind, self.key_types[0], key,
            |index, k| index.put(k, value),
            Err(null_key(&self.key_types))
        )
    }

    fn delete(&mut self, key: &[Value]) -> Result<bool> {
        with_trie_key!(
            MultiKind, &mut self.kind, self.key_types[0], key,
            |index, k| index.delete(&k),
            Ok(false)
        )
    }

    fn delete_value(&mut self, key: &[Value], value: i64) -> Result<bool> {
        with_trie_key!(
            MultiKind, &mut self.kind, self.key_types[0], key,
            |index, k| index.delete_value(&k, value),
            Ok(false)
        )
    }

    fn commit(&mut self) -> Result<()> {
        each_multi!(&mut self.kind, |index| index.commit())
    }

    fn rollback(&mut self) {
        each_multi!(&mut self.kind, |index| index.rollback())
    }

    fn stats(&self) -> Result<StatsReport> {
        let stats = each_multi!(&self.kind, |index| index.stats()?);
        Ok(StatsReport::Multi(stats))
    }

    fn close(&mut self) -> Result<()> {
        each_multi!(&mut self.kind, |index| index.close());
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        each_multi!(&mut self.kind, |index| index.reopen())
    }

    fn drop_index(&mut self) -> Result<()> {
        each_multi!(&mut self.kind, |index| index.drop_index())
    }

    fn is_unique(&self) -> bool {
        false
    }

    fn key_types(&self) -> &[DataType] {
        &self.key_types
    }
}
