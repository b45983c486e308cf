//! Append-only record file with staged mutations.
//!
//! `StagedFile` owns one index file and implements the two-phase discipline
//! shared by every index: records are allocated at the logical end of the
//! file, staged in memory, written in offset order on `commit` and discarded
//! on `rollback`. Committed records are served from an access-counted cache.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use strata_core::{Config, Error, Result};
use tracing::{debug, error, info};

const READ_BUFFER_SIZE: usize = 4096;

/// Encodes and decodes the records of a [`StagedFile`].
pub trait RecordCodec {
    type Record: Clone;
    /// Tells `decode` which record shape lives at an offset.
    type Kind: Copy + fmt::Debug;

    fn decode(&self, kind: Self::Kind, reader: &mut dyn Read) -> Result<Self::Record>;

    fn encode(&self, record: &Self::Record, out: &mut Vec<u8>);
}

enum FileState {
    Open(File),
    Closed,
    Dropped,
}

struct Cached<R> {
    record: R,
    accesses: u32,
}

/// An append-only file of records with pending/commit/rollback semantics.
pub struct StagedFile<C: RecordCodec> {
    path: PathBuf,
    state: FileState,
    codec: C,
    /// Logical end of the file, including staged allocations.
    file_pointer: u64,
    /// End of the file as of the last commit.
    stable_file_pointer: u64,
    cache: HashMap<u64, Cached<C::Record>>,
    pending: BTreeMap<u64, C::Record>,
    sync_on_commit: bool,
    max_cached: usize,
    eviction_threshold: u32,
}

impl<C: RecordCodec> StagedFile<C> {
    /// Opens the file at `path`, creating it if missing.
    pub fn open(path: impl AsRef<Path>, codec: C, config: &Config) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            state: FileState::Open(file),
            codec,
            file_pointer: len,
            stable_file_pointer: len,
            cache: HashMap::new(),
            pending: BTreeMap::new(),
            sync_on_commit: config.sync_on_commit,
            max_cached: config.max_cached_nodes,
            eviction_threshold: config.cache_eviction_threshold,
        })
    }

    /// Writes `header` to an empty file. Returns false if the file already had content.
    pub fn initialize(&mut self, header: &[u8]) -> Result<bool> {
        if self.stable_file_pointer > 0 || !self.pending.is_empty() {
            return Ok(false);
        }
        let mut file = self.file()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(header)?;
        if self.sync_on_commit {
            file.sync_data()?;
        }
        self.file_pointer = header.len() as u64;
        self.stable_file_pointer = self.file_pointer;
        info!(path = %self.path.display(), "created index file");
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Logical length, including staged allocations.
    pub fn len(&self) -> u64 {
        self.file_pointer
    }

    pub fn is_empty(&self) -> bool {
        self.file_pointer == 0
    }

    /// Length as of the last commit.
    pub fn stable_len(&self) -> u64 {
        self.stable_file_pointer
    }

    fn file(&self) -> Result<&File> {
        match &self.state {
            FileState::Open(file) => Ok(file),
            FileState::Closed => Err(Error::invalid_operation(format!(
                "index file {} is closed",
                self.path.display()
            ))),
            FileState::Dropped => Err(Error::invalid_operation(format!(
                "index file {} was dropped",
                self.path.display()
            ))),
        }
    }

    /// Reserves `size` bytes at the logical end of the file.
    pub fn allocate(&mut self, size: u64) -> u64 {
        let pos = self.file_pointer;
        self.file_pointer += size;
        pos
    }

    /// Stages a record at an allocated offset.
    pub fn stage(&mut self, pos: u64, record: C::Record) {
        self.pending.insert(pos, record);
    }

    pub fn is_pending(&self, pos: u64) -> bool {
        self.pending.contains_key(&pos)
    }

    /// Returns the record at `pos`, preferring staged records over committed ones.
    pub fn get(&mut self, pos: u64, kind: C::Kind) -> Result<&C::Record> {
        if let Some(record) = self.pending.get(&pos) {
            return Ok(record);
        }
        match self.cache.entry(pos) {
            Entry::Occupied(entry) => {
                let cached = entry.into_mut();
                cached.accesses = cached.accesses.saturating_add(1);
                Ok(&cached.record)
            }
            Entry::Vacant(entry) => {
                if pos >= self.stable_file_pointer {
                    return Err(Error::inconsistent(format!(
                        "{:?} record at {} is past the committed end {} of {}",
                        kind,
                        pos,
                        self.stable_file_pointer,
                        self.path.display()
                    )));
                }
                let file = match &self.state {
                    FileState::Open(file) => file,
                    _ => {
                        return Err(Error::invalid_operation(format!(
                            "index file {} is not open",
                            self.path.display()
                        )))
                    }
                };
                let record = read_record(file, &self.codec, pos, kind)?;
                let cached = entry.insert(Cached {
                    record,
                    accesses: 1,
                });
                Ok(&cached.record)
            }
        }
    }

    /// Applies `f` to a staged copy of the record at `pos`.
    ///
    /// Committed records are copied into the pending set first, so the durable
    /// cache only changes on commit.
    pub fn modify<F>(&mut self, pos: u64, kind: C::Kind, f: F) -> Result<()>
    where
        F: FnOnce(&mut C::Record) -> Result<()>,
    {
        if let Some(record) = self.pending.get_mut(&pos) {
            return f(record);
        }
        let mut record = self.get(pos, kind)?.clone();
        f(&mut record)?;
        self.pending.insert(pos, record);
        Ok(())
    }

    /// Writes every staged record and makes it durable. Returns the number flushed.
    pub fn commit(&mut self) -> Result<usize> {
        let mut file = self.file()?;
        let mut buf = Vec::new();
        for (pos, record) in &self.pending {
            buf.clear();
            self.codec.encode(record, &mut buf);
            file.seek(SeekFrom::Start(*pos))?;
            file.write_all(&buf)?;
        }
        if self.sync_on_commit {
            file.sync_data()?;
        }
        let length = file.metadata()?.len();
        if length != self.file_pointer {
            error!(
                path = %self.path.display(),
                file_pointer = self.file_pointer,
                length,
                "file length diverged from allocator"
            );
            return Err(Error::inconsistent(format!(
                "{}: allocated up to {} but file length is {}",
                self.path.display(),
                self.file_pointer,
                length
            )));
        }

        let flushed = self.pending.len();
        for (pos, record) in std::mem::take(&mut self.pending) {
            match self.cache.entry(pos) {
                Entry::Occupied(mut entry) => entry.get_mut().record = record,
                Entry::Vacant(entry) => {
                    entry.insert(Cached {
                        record,
                        accesses: 0,
                    });
                }
            }
        }
        self.stable_file_pointer = self.file_pointer;
        debug!(path = %self.path.display(), flushed, length, "committed");

        if self.cache.len() > self.max_cached {
            self.clean_up_below(self.eviction_threshold);
        }
        Ok(flushed)
    }

    /// Discards staged records and allocations. Returns the number discarded.
    pub fn rollback(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        self.file_pointer = self.stable_file_pointer;
        debug!(path = %self.path.display(), discarded, "rolled back");
        discarded
    }

    /// Drops the whole committed-record cache.
    pub fn clean_up(&mut self) {
        self.cache.clear();
    }

    /// Drops cached records accessed fewer than `limit` times.
    pub fn clean_up_below(&mut self, limit: u32) {
        let before = self.cache.len();
        self.cache.retain(|_, cached| cached.accesses >= limit);
        info!(
            path = %self.path.display(),
            evicted = before - self.cache.len(),
            remaining = self.cache.len(),
            "evicted cold index nodes"
        );
    }

    /// Releases the file handle and the cache. Staged records are kept.
    pub fn close(&mut self) {
        self.clean_up();
        if let FileState::Open(_) = self.state {
            self.state = FileState::Closed;
        }
    }

    pub fn reopen(&mut self) -> Result<()> {
        match self.state {
            FileState::Open(_) => Ok(()),
            FileState::Dropped => Err(Error::invalid_operation(format!(
                "index file {} was dropped",
                self.path.display()
            ))),
            FileState::Closed => {
                let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
                self.state = FileState::Open(file);
                Ok(())
            }
        }
    }

    /// Closes and deletes the file.
    pub fn delete(&mut self) -> Result<()> {
        self.close();
        self.pending.clear();
        if let FileState::Dropped = self.state {
            return Ok(());
        }
        self.state = FileState::Dropped;
        fs::remove_file(&self.path)?;
        info!(path = %self.path.display(), "dropped index file");
        Ok(())
    }

    /// Size of the file on disk, or the committed length when closed.
    pub fn file_size(&self) -> Result<u64> {
        match &self.state {
            FileState::Open(file) => Ok(file.metadata()?.len()),
            _ => Ok(self.stable_file_pointer),
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn skew_allocator(&mut self, delta: u64) {
        self.file_pointer += delta;
    }
}

fn read_record<C: RecordCodec>(
    file: &File,
    codec: &C,
    pos: u64,
    kind: C::Kind,
) -> Result<C::Record> {
    let mut handle = file;
    handle.seek(SeekFrom::Start(pos))?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, handle);
    codec.decode(kind, &mut reader)
}
