//! Key and value codecs.
//!
//! Every stored column starts with a marker byte: `0` for NULL, `1` for a value.
//! Integers and floats are big-endian, strings are an `i32` code-unit count
//! followed by UTF-16BE code units.

use crate::traits::{KeyType, LeafType};
use std::io::Read;
use strata_core::{canonical_float_bits, float_key_eq, DataType, Error, Result, Value};

pub(crate) const NULL_MARKER: u8 = 0;
pub(crate) const VALUE_MARKER: u8 = 1;

pub(crate) fn read_u8(reader: &mut dyn Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_i32(reader: &mut dyn Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

pub(crate) fn read_i64(reader: &mut dyn Read) -> Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

/// Reads a marker byte, returning false for NULL.
fn read_marker(reader: &mut dyn Read) -> Result<bool> {
    match read_u8(reader)? {
        NULL_MARKER => Ok(false),
        VALUE_MARKER => Ok(true),
        other => Err(Error::inconsistent(format!("invalid column marker {}", other))),
    }
}

fn require_value(reader: &mut dyn Read, what: &str) -> Result<()> {
    if read_marker(reader)? {
        Ok(())
    } else {
        Err(Error::inconsistent(format!("NULL stored as {} key", what)))
    }
}

fn write_utf16(s: &str, out: &mut Vec<u8>) {
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(utf16_len(s) as i32).to_be_bytes());
    write_utf16(s, out);
}

fn read_string(reader: &mut dyn Read) -> Result<String> {
    let len = read_i32(reader)?;
    if len < 0 {
        return Err(Error::inconsistent(format!("negative string length {}", len)));
    }
    let mut buf = vec![0u8; len as usize * 2];
    reader.read_exact(&mut buf)?;
    let units: Vec<u16> = buf
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| Error::inconsistent("invalid UTF-16 in stored string"))
}

/// Writes one column value with its marker.
pub fn write_column(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(NULL_MARKER),
        Value::Boolean(b) => {
            out.push(VALUE_MARKER);
            out.push(*b as u8);
        }
        Value::Int64(v) | Value::DateTime(v) => {
            out.push(VALUE_MARKER);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Float64(v) => {
            out.push(VALUE_MARKER);
            out.extend_from_slice(&canonical_float_bits(*v).to_be_bytes());
        }
        Value::String(s) => {
            out.push(VALUE_MARKER);
            write_string(s, out);
        }
    }
}

/// Reads one column value of the given type.
pub fn read_column(data_type: DataType, reader: &mut dyn Read) -> Result<Value> {
    if !read_marker(reader)? {
        return Ok(Value::Null);
    }
    let value = match data_type {
        DataType::Boolean => Value::Boolean(read_u8(reader)? != 0),
        DataType::Int64 => Value::Int64(read_i64(reader)?),
        DataType::DateTime => Value::DateTime(read_i64(reader)?),
        DataType::Float64 => Value::Float64(f64::from_bits(read_i64(reader)? as u64)),
        DataType::String => Value::String(read_string(reader)?),
    };
    Ok(value)
}

/// Size of [`write_column`] output.
pub fn column_size(value: &Value) -> u64 {
    match value {
        Value::Null => 1,
        Value::Boolean(_) => 2,
        Value::Int64(_) | Value::DateTime(_) | Value::Float64(_) => 9,
        Value::String(s) => 1 + 4 + 2 * utf16_len(s) as u64,
    }
}

/// 64-bit integer keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct LongKeyType;

impl KeyType for LongKeyType {
    type Key = i64;

    fn to_bytes(&self, key: &i64) -> Vec<u8> {
        key.to_be_bytes().to_vec()
    }

    fn write(&self, key: &i64, out: &mut Vec<u8>) {
        out.push(VALUE_MARKER);
        out.extend_from_slice(&key.to_be_bytes());
    }

    fn read(&self, reader: &mut dyn Read) -> Result<i64> {
        require_value(reader, "long")?;
        read_i64(reader)
    }

    fn size(&self, _key: &i64) -> u64 {
        9
    }

    fn keys_equal(&self, a: &i64, b: &i64) -> bool {
        a == b
    }
}

/// String keys, addressed by their UTF-16BE code units.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringKeyType;

impl KeyType for StringKeyType {
    type Key = String;

    fn to_bytes(&self, key: &String) -> Vec<u8> {
        let mut out = Vec::with_capacity(key.len() * 2);
        write_utf16(key, &mut out);
        out
    }

    fn write(&self, key: &String, out: &mut Vec<u8>) {
        out.push(VALUE_MARKER);
        write_string(key, out);
    }

    fn read(&self, reader: &mut dyn Read) -> Result<String> {
        require_value(reader, "string")?;
        read_string(reader)
    }

    fn size(&self, key: &String) -> u64 {
        1 + 4 + 2 * utf16_len(key) as u64
    }

    fn keys_equal(&self, a: &String, b: &String) -> bool {
        a == b
    }
}

/// Double keys. All NaNs address the same key; `0.0` and `-0.0` are distinct.
#[derive(Clone, Copy, Debug, Default)]
pub struct DoubleKeyType;

impl KeyType for DoubleKeyType {
    type Key = f64;

    fn to_bytes(&self, key: &f64) -> Vec<u8> {
        canonical_float_bits(*key).to_be_bytes().to_vec()
    }

    fn write(&self, key: &f64, out: &mut Vec<u8>) {
        out.push(VALUE_MARKER);
        out.extend_from_slice(&canonical_float_bits(*key).to_be_bytes());
    }

    fn read(&self, reader: &mut dyn Read) -> Result<f64> {
        require_value(reader, "double")?;
        Ok(f64::from_bits(read_i64(reader)? as u64))
    }

    fn size(&self, _key: &f64) -> u64 {
        9
    }

    fn keys_equal(&self, a: &f64, b: &f64) -> bool {
        float_key_eq(*a, *b)
    }
}

/// Fixed tuples of columns. Components may be NULL.
#[derive(Clone, Debug)]
pub struct MultiKeyType {
    types: Vec<DataType>,
}

impl MultiKeyType {
    pub fn new(types: Vec<DataType>) -> Self {
        Self { types }
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }
}

impl KeyType for MultiKeyType {
    type Key = Vec<Value>;

    fn to_bytes(&self, key: &Vec<Value>) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(key, &mut out);
        out
    }

    fn write(&self, key: &Vec<Value>, out: &mut Vec<u8>) {
        for value in key {
            write_column(value, out);
        }
    }

    fn read(&self, reader: &mut dyn Read) -> Result<Vec<Value>> {
        self.types
            .iter()
            .map(|data_type| read_column(*data_type, reader))
            .collect()
    }

    fn size(&self, key: &Vec<Value>) -> u64 {
        key.iter().map(column_size).sum()
    }

    fn keys_equal(&self, a: &Vec<Value>, b: &Vec<Value>) -> bool {
        a == b
    }

    fn validate(&self, key: &Vec<Value>) -> Result<()> {
        if key.len() != self.types.len() {
            return Err(Error::invalid_operation(format!(
                "expected {} key columns, got {}",
                self.types.len(),
                key.len()
            )));
        }
        for (value, expected) in key.iter().zip(&self.types) {
            match value.data_type() {
                None => {}
                Some(got) if got == *expected => {}
                got => return Err(Error::type_mismatch(*expected, got)),
            }
        }
        Ok(())
    }
}

/// 64-bit values, stored without a marker.
#[derive(Clone, Copy, Debug, Default)]
pub struct LongLeafType;

impl LeafType for LongLeafType {
    type Value = i64;

    fn write(&self, value: &i64, out: &mut Vec<u8>) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    fn read(&self, reader: &mut dyn Read) -> Result<i64> {
        read_i64(reader)
    }

    fn size(&self, _value: &i64) -> u64 {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stored<K: KeyType>(key_type: &K, key: &K::Key) -> Vec<u8> {
        let mut out = Vec::new();
        key_type.write(key, &mut out);
        out
    }

    #[test]
    fn test_long_key_layout() {
        let bytes = stored(&LongKeyType, &10);
        assert_eq!(bytes, vec![1, 0, 0, 0, 0, 0, 0, 0, 10]);
        assert_eq!(LongKeyType.size(&10) + LongLeafType.size(&0), 17);
        assert_eq!(LongKeyType.to_bytes(&-1), vec![0xff; 8]);
    }

    #[test]
    fn test_long_key_read() {
        let bytes = stored(&LongKeyType, &-42);
        assert_eq!(LongKeyType.read(&mut Cursor::new(bytes)).unwrap(), -42);

        let err = LongKeyType.read(&mut Cursor::new(vec![0u8])).unwrap_err();
        assert!(err.is_inconsistent());
    }

    #[test]
    fn test_string_path_bytes() {
        assert_eq!(StringKeyType.to_bytes(&"a".to_string()), vec![0x00, 0x61]);
        assert_eq!(
            StringKeyType.to_bytes(&"aa".to_string()),
            vec![0x00, 0x61, 0x00, 0x61]
        );
        assert!(StringKeyType.to_bytes(&String::new()).is_empty());
    }

    #[test]
    fn test_string_stored_form() {
        let key = "h\u{e9}\u{1F600}".to_string();
        let bytes = stored(&StringKeyType, &key);
        assert_eq!(bytes.len() as u64, StringKeyType.size(&key));
        // the emoji is a surrogate pair
        assert_eq!(&bytes[1..5], &4i32.to_be_bytes());
        assert_eq!(StringKeyType.read(&mut Cursor::new(bytes)).unwrap(), key);
    }

    #[test]
    fn test_double_key_equality() {
        assert!(DoubleKeyType.keys_equal(&f64::NAN, &-f64::NAN));
        assert!(!DoubleKeyType.keys_equal(&0.0, &-0.0));
        assert_eq!(
            DoubleKeyType.to_bytes(&f64::NAN),
            DoubleKeyType.to_bytes(&f64::from_bits(0x7ff8_0000_0000_0001))
        );
        let bytes = stored(&DoubleKeyType, &1.5);
        assert_eq!(DoubleKeyType.read(&mut Cursor::new(bytes)).unwrap(), 1.5);
    }

    #[test]
    fn test_column_round_trip_with_nulls() {
        let key_type = MultiKeyType::new(vec![
            DataType::Int64,
            DataType::String,
            DataType::Boolean,
            DataType::DateTime,
        ]);
        let key = vec![
            Value::Int64(7),
            Value::Null,
            Value::Boolean(true),
            Value::DateTime(1_600_000_000_000),
        ];
        key_type.validate(&key).unwrap();
        let bytes = stored(&key_type, &key);
        assert_eq!(bytes.len() as u64, key_type.size(&key));
        assert_eq!(bytes, key_type.to_bytes(&key));
        assert_eq!(key_type.read(&mut Cursor::new(bytes)).unwrap(), key);
    }

    #[test]
    fn test_multi_key_validation() {
        let key_type = MultiKeyType::new(vec![DataType::Int64, DataType::String]);

        let err = key_type.validate(&vec![Value::Int64(1)]).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));

        let err = key_type
            .validate(&vec![Value::String("x".into()), Value::Null])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: DataType::Int64,
                got: Some(DataType::String)
            }
        ));
    }

    #[test]
    fn test_invalid_marker() {
        let err = read_column(DataType::Int64, &mut Cursor::new(vec![7u8])).unwrap_err();
        assert!(err.is_inconsistent());
    }
}
