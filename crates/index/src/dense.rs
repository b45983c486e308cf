//! Dense index for auto-increment id columns.
//!
//! The file is a flat big-endian `i64` array addressed by key, with no header.
//! It is cached and staged in segments of `SEGMENT_SIZE` entries; `-1` marks an
//! empty entry.

use crate::staged::{RecordCodec, StagedFile};
use crate::stats::IndexStats;
use std::io::Read;
use std::path::Path;
use strata_core::{Config, Error, Result};
use tracing::debug;

/// Entries per segment.
pub const SEGMENT_SIZE: usize = 4096;
/// On-disk size of a segment.
pub const SEGMENT_BYTES: u64 = SEGMENT_SIZE as u64 * 8;
/// Marks an empty entry.
pub const EMPTY: i64 = -1;
/// Most segments a single `put` may append to reach its key.
pub const MAX_GAP_SEGMENTS: u64 = 256;

pub struct SegmentCodec;

impl RecordCodec for SegmentCodec {
    type Record = Vec<i64>;
    type Kind = ();

    fn decode(&self, _kind: (), reader: &mut dyn Read) -> Result<Vec<i64>> {
        let mut buf = vec![0u8; SEGMENT_BYTES as usize];
        reader.read_exact(&mut buf)?;
        Ok(buf
            .chunks_exact(8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                i64::from_be_bytes(raw)
            })
            .collect())
    }

    fn encode(&self, segment: &Vec<i64>, out: &mut Vec<u8>) {
        out.reserve(SEGMENT_BYTES as usize);
        for value in segment {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

/// Segment offset and entry index of `key`, or `None` if the key has no
/// addressable byte offset.
fn locate(key: i64) -> Option<(u64, usize)> {
    if key < 0 {
        return None;
    }
    let byte = (key as u64).checked_mul(8)?;
    Some((
        byte - byte % SEGMENT_BYTES,
        (key as u64 % SEGMENT_SIZE as u64) as usize,
    ))
}

/// Highest occupied entry, scanning segments back from the end of the file.
fn recover_last_id(file: &mut StagedFile<SegmentCodec>) -> Result<i64> {
    let mut pos = file.stable_len();
    while pos > 0 {
        pos -= SEGMENT_BYTES;
        if let Some(i) = file.get(pos, ())?.iter().rposition(|v| *v != EMPTY) {
            return Ok((pos / 8) as i64 + i as i64);
        }
    }
    Ok(EMPTY)
}

/// Unique index from non-negative `i64` ids to non-negative `i64` values.
pub struct IdIndex {
    file: StagedFile<SegmentCodec>,
    last_id: i64,
    stable_last_id: i64,
}

impl IdIndex {
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let mut file = StagedFile::open(path, SegmentCodec, config)?;
        let len = file.stable_len();
        if len % SEGMENT_BYTES != 0 {
            return Err(Error::inconsistent(format!(
                "{}: length {} is not a whole number of segments",
                file.path().display(),
                len
            )));
        }
        let last_id = recover_last_id(&mut file)?;
        debug!(path = %file.path().display(), last_id, "opened id index");
        Ok(Self {
            file,
            last_id,
            stable_last_id: last_id,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Highest live id when the index was opened, raised by every later `put`.
    /// Deletes do not lower it. `-1` for an empty index.
    pub fn last_id(&self) -> i64 {
        self.last_id
    }

    pub fn get(&mut self, key: i64) -> Result<Option<i64>> {
        let (pos, offset) = match locate(key) {
            Some(location) => location,
            None => return Ok(None),
        };
        if pos >= self.file.len() {
            return Ok(None);
        }
        let value = self.file.get(pos, ())?[offset];
        Ok(if value == EMPTY { None } else { Some(value) })
    }

    pub fn contains(&mut self, key: i64) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Stores `value` under `key`. Fails with a duplicate key error if the entry is taken.
    pub fn put(&mut self, key: i64, value: i64) -> Result<()> {
        if key < 0 || value < 0 {
            return Err(Error::invalid_operation(format!(
                "id index entries must be non-negative, got {} -> {}",
                key, value
            )));
        }
        let (pos, offset) = locate(key).ok_or_else(|| {
            Error::invalid_operation(format!("id {} is beyond the addressable range", key))
        })?;
        if pos >= self.file.len() {
            let appended = (pos - self.file.len()) / SEGMENT_BYTES + 1;
            if appended > MAX_GAP_SEGMENTS {
                return Err(Error::invalid_operation(format!(
                    "id {} would append {} segments, at most {} allowed",
                    key, appended, MAX_GAP_SEGMENTS
                )));
            }
        }
        // materialize gap segments so the file stays dense
        while self.file.len() <= pos {
            let gap = self.file.allocate(SEGMENT_BYTES);
            self.file.stage(gap, vec![EMPTY; SEGMENT_SIZE]);
        }
        self.file.modify(pos, (), |segment| {
            if segment[offset] != EMPTY {
                return Err(Error::duplicate_key(key));
            }
            segment[offset] = value;
            Ok(())
        })?;
        self.last_id = self.last_id.max(key);
        Ok(())
    }

    pub fn delete(&mut self, key: i64) -> Result<bool> {
        if self.get(key)?.is_none() {
            return Ok(false);
        }
        let (pos, offset) = match locate(key) {
            Some(location) => location,
            None => return Ok(false),
        };
        self.file.modify(pos, (), |segment| {
            segment[offset] = EMPTY;
            Ok(())
        })?;
        Ok(true)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.file.commit()?;
        self.stable_last_id = self.last_id;
        Ok(())
    }

    pub fn rollback(&mut self) {
        self.file.rollback();
        self.last_id = self.stable_last_id;
    }

    pub fn clean_up(&mut self) {
        self.file.clean_up();
    }

    pub fn close(&mut self) {
        self.file.close();
    }

    pub fn reopen(&mut self) -> Result<()> {
        self.file.reopen()
    }

    pub fn drop_index(&mut self) -> Result<()> {
        self.file.delete()
    }

    pub fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            file_size: self.file.file_size()?,
            in_memory_nodes: self.file.cached_count(),
            pending_nodes: self.file.pending_count(),
        })
    }
}
