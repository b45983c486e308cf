//! Multi-value index: a trie of chain anchors plus a file of linked chain nodes.
//!
//! The trie (`<base>#index`) maps each key to the first and last node of its
//! chain. The chain file (`<base>#chain`) holds fixed 88-byte nodes: a next
//! pointer followed by ten value slots. Values are appended at the tail;
//! deletes punch holes that readers skip.

use crate::codec::read_i64;
use crate::staged::{RecordCodec, StagedFile};
use crate::stats::{IndexStats, MultiIndexStats};
use crate::traits::{KeyType, LeafType};
use crate::trie::ByteTrie;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use strata_core::{Config, Error, Result};
use tracing::debug;

/// Value slots per chain node.
pub const CHAIN_CAPACITY: usize = 10;
/// On-disk size of a chain node.
pub const CHAIN_NODE_SIZE: u64 = (CHAIN_CAPACITY as u64 + 1) * 8;
/// Marks an empty or deleted value slot.
pub const EMPTY_SLOT: i64 = i64::MIN;

/// Chain anchor stored in the trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultiLeaf {
    pub first: u64,
    pub last: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MultiLeafType;

impl LeafType for MultiLeafType {
    type Value = MultiLeaf;

    fn write(&self, value: &MultiLeaf, out: &mut Vec<u8>) {
        out.extend_from_slice(&(value.first as i64).to_be_bytes());
        out.extend_from_slice(&(value.last as i64).to_be_bytes());
    }

    fn read(&self, reader: &mut dyn Read) -> Result<MultiLeaf> {
        let first = read_i64(reader)?;
        let last = read_i64(reader)?;
        if first <= 0 || last <= 0 {
            return Err(Error::inconsistent(format!(
                "invalid chain anchor ({}, {})",
                first, last
            )));
        }
        Ok(MultiLeaf {
            first: first as u64,
            last: last as u64,
        })
    }

    fn size(&self, _value: &MultiLeaf) -> u64 {
        16
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainNode {
    /// Offset of the next node, `0` at the tail.
    pub next: u64,
    pub values: [i64; CHAIN_CAPACITY],
}

impl ChainNode {
    fn empty() -> Self {
        Self {
            next: 0,
            values: [EMPTY_SLOT; CHAIN_CAPACITY],
        }
    }

    fn live_values(&self) -> impl Iterator<Item = i64> + '_ {
        self.values.iter().copied().filter(|v| *v != EMPTY_SLOT)
    }

    /// Slot after the last occupied one, if any is left.
    fn append_slot(&self) -> Option<usize> {
        match self.values.iter().rposition(|v| *v != EMPTY_SLOT) {
            None => Some(0),
            Some(last) if last + 1 < CHAIN_CAPACITY => Some(last + 1),
            Some(_) => None,
        }
    }
}

pub struct ChainCodec;

impl RecordCodec for ChainCodec {
    type Record = ChainNode;
    type Kind = ();

    fn decode(&self, _kind: (), reader: &mut dyn Read) -> Result<ChainNode> {
        let next = read_i64(reader)?;
        if next < 0 {
            return Err(Error::inconsistent(format!("negative chain pointer {}", next)));
        }
        let mut values = [EMPTY_SLOT; CHAIN_CAPACITY];
        for value in values.iter_mut() {
            *value = read_i64(reader)?;
        }
        Ok(ChainNode {
            next: next as u64,
            values,
        })
    }

    fn encode(&self, node: &ChainNode, out: &mut Vec<u8>) {
        out.extend_from_slice(&(node.next as i64).to_be_bytes());
        for value in &node.values {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

/// Appends `suffix` to the file name of `base`.
pub(crate) fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Maps each key to an ordered list of `i64` values.
pub struct ByteMultiTrie<KT: KeyType> {
    trie: ByteTrie<KT, MultiLeafType>,
    chain: StagedFile<ChainCodec>,
}

impl<KT: KeyType> ByteMultiTrie<KT> {
    /// Opens `<base>#index` and `<base>#chain`, creating them if needed.
    pub fn open(base: impl AsRef<Path>, key_type: KT, config: &Config) -> Result<Self> {
        let base = base.as_ref();
        let trie = ByteTrie::open(with_suffix(base, "#index"), key_type, MultiLeafType, config)?;
        let mut chain = StagedFile::open(with_suffix(base, "#chain"), ChainCodec, config)?;
        // offset 0 stays the null pointer
        chain.initialize(&[0u8])?;
        Ok(Self { trie, chain })
    }

    pub fn key_type(&self) -> &KT {
        self.trie.key_type()
    }

    /// Returns every value under `key` in insertion order.
    pub fn get(&mut self, key: &KT::Key) -> Result<Vec<i64>> {
        let leaf = match self.trie.get(key)? {
            Some(leaf) => leaf,
            None => return Ok(Vec::new()),
        };
        let mut values = Vec::new();
        let mut pos = leaf.first;
        while pos != 0 {
            let node = self.chain.get(pos, ())?;
            values.extend(node.live_values());
            pos = node.next;
        }
        Ok(values)
    }

    pub fn contains(&mut self, key: &KT::Key) -> Result<bool> {
        Ok(!self.get(key)?.is_empty())
    }

    /// Appends `value` to the chain of `key`.
    pub fn put(&mut self, key: KT::Key, value: i64) -> Result<()> {
        if value == EMPTY_SLOT {
            return Err(Error::invalid_operation(format!(
                "{} is reserved for empty chain slots",
                EMPTY_SLOT
            )));
        }
        let leaf = match self.trie.get(&key)? {
            Some(leaf) => leaf,
            None => {
                let pos = self.chain.allocate(CHAIN_NODE_SIZE);
                self.chain.stage(pos, ChainNode::empty());
                let leaf = MultiLeaf {
                    first: pos,
                    last: pos,
                };
                self.trie.put(key.clone(), leaf)?;
                leaf
            }
        };

        let slot = self.chain.get(leaf.last, ())?.append_slot();
        match slot {
            Some(slot) => self.chain.modify(leaf.last, (), |tail| {
                tail.values[slot] = value;
                Ok(())
            }),
            None => {
                let pos = self.chain.allocate(CHAIN_NODE_SIZE);
                let mut node = ChainNode::empty();
                node.values[0] = value;
                self.chain.stage(pos, node);
                self.chain.modify(leaf.last, (), |tail| {
                    tail.next = pos;
                    Ok(())
                })?;
                // the trie has no in-place update
                self.trie.delete(&key)?;
                self.trie.put(
                    key,
                    MultiLeaf {
                        first: leaf.first,
                        last: pos,
                    },
                )
            }
        }
    }

    /// Clears the first slot holding `value`. Chain nodes are never removed.
    pub fn delete_value(&mut self, key: &KT::Key, value: i64) -> Result<bool> {
        if value == EMPTY_SLOT {
            return Ok(false);
        }
        let leaf = match self.trie.get(key)? {
            Some(leaf) => leaf,
            None => return Ok(false),
        };
        let mut pos = leaf.first;
        while pos != 0 {
            let node = self.chain.get(pos, ())?;
            let next = node.next;
            let found = node.values.iter().position(|v| *v == value);
            if let Some(slot) = found {
                self.chain.modify(pos, (), |node| {
                    node.values[slot] = EMPTY_SLOT;
                    Ok(())
                })?;
                return Ok(true);
            }
            pos = next;
        }
        Ok(false)
    }

    /// Removes the key. Its chain becomes unreachable.
    pub fn delete(&mut self, key: &KT::Key) -> Result<bool> {
        self.trie.delete(key)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.trie.commit()?;
        let flushed = self.chain.commit()?;
        debug!(path = %self.chain.path().display(), flushed, "chain committed");
        Ok(())
    }

    pub fn rollback(&mut self) {
        self.trie.rollback();
        self.chain.rollback();
    }

    pub fn clean_up(&mut self) {
        self.trie.clean_up();
        self.chain.clean_up();
    }

    pub fn clean_up_below(&mut self, limit: u32) {
        self.trie.clean_up_below(limit);
        self.chain.clean_up_below(limit);
    }

    pub fn close(&mut self) {
        self.trie.close();
        self.chain.close();
    }

    pub fn reopen(&mut self) -> Result<()> {
        self.trie.reopen()?;
        self.chain.reopen()
    }

    /// Deletes both backing files.
    pub fn drop_index(&mut self) -> Result<()> {
        self.trie.drop_index()?;
        self.chain.delete()
    }

    pub fn stats(&self) -> Result<MultiIndexStats> {
        let trie = self.trie.stats()?;
        let chain = IndexStats {
            file_size: self.chain.file_size()?,
            in_memory_nodes: self.chain.cached_count(),
            pending_nodes: self.chain.pending_count(),
        };
        Ok(MultiIndexStats::new(trie, chain))
    }

    #[cfg(test)]
    pub(crate) fn chain_file_mut(&mut self) -> &mut StagedFile<ChainCodec> {
        &mut self.chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{LongKeyType, StringKeyType};
    use tempfile::TempDir;

    fn long_multi(dir: &TempDir) -> ByteMultiTrie<LongKeyType> {
        ByteMultiTrie::open(dir.path().join("multi"), LongKeyType, &Config::default()).unwrap()
    }

    #[test]
    fn test_files_created() {
        let dir = TempDir::new().unwrap();
        let multi = long_multi(&dir);
        assert!(dir.path().join("multi#index").exists());
        assert!(dir.path().join("multi#chain").exists());
        let stats = multi.stats().unwrap();
        assert_eq!(stats.chain_file_size, 1);
    }

    #[test]
    fn test_put_get() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        multi.put(1, 10).unwrap();
        multi.put(1, 11).unwrap();
        multi.put(2, 0).unwrap();
        assert_eq!(multi.get(&1).unwrap(), vec![10, 11]);
        multi.commit().unwrap();

        assert_eq!(multi.get(&1).unwrap(), vec![10, 11]);
        assert_eq!(multi.get(&2).unwrap(), vec![0]);
        assert!(multi.get(&3).unwrap().is_empty());
        assert!(!multi.contains(&3).unwrap());
    }

    #[test]
    fn test_chain_commit_detects_allocator_skew() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        multi.put(1, 10).unwrap();
        multi.chain_file_mut().skew_allocator(CHAIN_NODE_SIZE);

        let err = multi.commit().unwrap_err();
        assert!(err.is_inconsistent());
    }

    #[test]
    fn test_chaining_25_values() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        for v in 0..25 {
            multi.put(7, v).unwrap();
        }
        assert_eq!(multi.stats().unwrap().chain_pending_nodes, 3);
        multi.commit().unwrap();
        assert_eq!(multi.stats().unwrap().chain_file_size, 1 + 3 * CHAIN_NODE_SIZE);
        assert_eq!(multi.get(&7).unwrap(), (0..25).collect::<Vec<_>>());

        assert!(multi.delete_value(&7, 12).unwrap());
        let expected: Vec<i64> = (0..25).filter(|v| *v != 12).collect();
        assert_eq!(multi.get(&7).unwrap(), expected);
    }

    #[test]
    fn test_delete_one_occurrence() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        for v in [5, 6, 5, 7] {
            multi.put(1, v).unwrap();
        }
        assert!(multi.delete_value(&1, 5).unwrap());
        assert_eq!(multi.get(&1).unwrap(), vec![6, 5, 7]);
    }

    #[test]
    fn test_hole_tolerance() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        multi.put(1, 10).unwrap();
        multi.put(1, 20).unwrap();
        multi.commit().unwrap();

        assert!(!multi.delete_value(&1, 30).unwrap());
        assert!(!multi.delete_value(&2, 10).unwrap());
        assert_eq!(multi.get(&1).unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_append_after_hole_keeps_order() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        for v in 1..=3 {
            multi.put(1, v).unwrap();
        }
        multi.delete_value(&1, 2).unwrap();
        multi.put(1, 4).unwrap();
        assert_eq!(multi.get(&1).unwrap(), vec![1, 3, 4]);
    }

    #[test]
    fn test_delete_key() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        multi.put(1, 10).unwrap();
        multi.commit().unwrap();
        assert!(multi.delete(&1).unwrap());
        assert!(multi.get(&1).unwrap().is_empty());
        multi.put(1, 20).unwrap();
        multi.commit().unwrap();
        assert_eq!(multi.get(&1).unwrap(), vec![20]);
    }

    #[test]
    fn test_rollback() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        for v in 0..10 {
            multi.put(1, v).unwrap();
        }
        multi.commit().unwrap();

        // overflows the full tail node, then is discarded
        multi.put(1, 10).unwrap();
        multi.put(2, 20).unwrap();
        multi.delete_value(&1, 3).unwrap();
        multi.rollback();

        assert_eq!(multi.get(&1).unwrap(), (0..10).collect::<Vec<_>>());
        assert!(multi.get(&2).unwrap().is_empty());
        let stats = multi.stats().unwrap();
        assert_eq!(stats.pending_nodes + stats.chain_pending_nodes, 0);

        multi.put(1, 10).unwrap();
        multi.commit().unwrap();
        assert_eq!(multi.get(&1).unwrap(), (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn test_durable_after_reopen() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        for v in 0..15 {
            multi.put(3, v * 100).unwrap();
        }
        multi.commit().unwrap();
        multi.close();
        multi.reopen().unwrap();
        assert_eq!(multi.get(&3).unwrap().len(), 15);

        let mut reopened = long_multi(&dir);
        assert_eq!(
            reopened.get(&3).unwrap(),
            (0..15).map(|v| v * 100).collect::<Vec<_>>()
        );
        // the chain file keeps its reserved byte
        assert_eq!(
            reopened.stats().unwrap().chain_file_size,
            1 + 2 * CHAIN_NODE_SIZE
        );
    }

    #[test]
    fn test_string_keys() {
        let dir = TempDir::new().unwrap();
        let mut multi =
            ByteMultiTrie::open(dir.path().join("names"), StringKeyType, &Config::default()).unwrap();
        multi.put("a".to_string(), 1).unwrap();
        multi.put("aa".to_string(), 2).unwrap();
        multi.put("a".to_string(), 3).unwrap();
        multi.commit().unwrap();
        assert_eq!(multi.get(&"a".to_string()).unwrap(), vec![1, 3]);
        assert_eq!(multi.get(&"aa".to_string()).unwrap(), vec![2]);
    }

    #[test]
    fn test_sentinel_rejected() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        assert!(matches!(
            multi.put(1, EMPTY_SLOT).unwrap_err(),
            Error::InvalidOperation { .. }
        ));
    }

    #[test]
    fn test_scenario_98_values() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        let values: Vec<i64> = (2..100).map(|i| i * 100).collect();
        assert_eq!(values.len(), 98);
        for chunk in values.chunks(13) {
            for v in chunk {
                multi.put(10, *v).unwrap();
            }
            multi.commit().unwrap();
        }
        multi.commit().unwrap();
        assert_eq!(multi.get(&10).unwrap(), values);

        assert!(multi.delete_value(&10, 500).unwrap());
        let remaining = multi.get(&10).unwrap();
        assert_eq!(remaining.len(), 97);
        assert!(!remaining.contains(&500));
        let expected: Vec<i64> = values.iter().copied().filter(|v| *v != 500).collect();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn test_drop_index() {
        let dir = TempDir::new().unwrap();
        let mut multi = long_multi(&dir);
        multi.put(1, 1).unwrap();
        multi.commit().unwrap();
        multi.drop_index().unwrap();
        assert!(!dir.path().join("multi#index").exists());
        assert!(!dir.path().join("multi#chain").exists());
    }
}
