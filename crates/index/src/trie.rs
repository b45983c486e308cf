//! Disk-resident prefix trie.
//!
//! Every key is serialized to bytes and each internal node consumes one byte.
//! Internal nodes hold 257 signed addresses: one slot per byte value plus a
//! terminal slot for a key that ends exactly at the node's prefix. Addresses
//! are file offsets: `0` is null, positive offsets are leaves and negative
//! offsets are internal nodes. The root internal node lives at offset 0.

use crate::staged::{RecordCodec, StagedFile};
use crate::stats::IndexStats;
use crate::traits::{KeyType, LeafType};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use strata_core::{Config, Error, Result};
use tracing::debug;

/// Slots per internal node.
pub const SLOTS: usize = 257;
/// Slot for keys that end at the node's prefix.
pub const TERMINAL: usize = 256;
/// On-disk size of an internal node.
pub const INTERNAL_NODE_SIZE: u64 = SLOTS as u64 * 8;

const ROOT: u64 = 0;

/// A decoded node address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Address {
    Null,
    Internal(u64),
    Leaf(u64),
}

impl Address {
    pub fn decode(raw: i64) -> Self {
        match raw {
            0 => Address::Null,
            raw if raw > 0 => Address::Leaf(raw as u64),
            raw => Address::Internal(raw.unsigned_abs()),
        }
    }

    pub fn encode(self) -> i64 {
        match self {
            Address::Null => 0,
            Address::Leaf(pos) => pos as i64,
            Address::Internal(pos) => -(pos as i64),
        }
    }
}

/// Slot addressed by the key byte at `depth`, or the terminal slot past the end.
fn slot_for(bytes: &[u8], depth: usize) -> usize {
    match bytes.get(depth) {
        Some(byte) => (*byte ^ 0x80) as usize,
        None => TERMINAL,
    }
}

#[derive(Clone, Debug)]
pub enum TrieNode<K, V> {
    Internal(Box<[i64; SLOTS]>),
    Leaf { key: K, value: V },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Internal,
    Leaf,
}

/// Record codec for trie nodes.
pub struct TrieCodec<KT, LT> {
    key_type: Arc<KT>,
    leaf_type: Arc<LT>,
}

impl<KT: KeyType, LT: LeafType> RecordCodec for TrieCodec<KT, LT> {
    type Record = TrieNode<KT::Key, LT::Value>;
    type Kind = NodeKind;

    fn decode(&self, kind: NodeKind, reader: &mut dyn Read) -> Result<Self::Record> {
        match kind {
            NodeKind::Internal => {
                let mut buf = vec![0u8; INTERNAL_NODE_SIZE as usize];
                reader.read_exact(&mut buf)?;
                let mut slots = Box::new([0i64; SLOTS]);
                for (slot, chunk) in slots.iter_mut().zip(buf.chunks_exact(8)) {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(chunk);
                    *slot = i64::from_be_bytes(raw);
                }
                Ok(TrieNode::Internal(slots))
            }
            NodeKind::Leaf => {
                let key = self.key_type.read(reader)?;
                let value = self.leaf_type.read(reader)?;
                Ok(TrieNode::Leaf { key, value })
            }
        }
    }

    fn encode(&self, record: &Self::Record, out: &mut Vec<u8>) {
        match record {
            TrieNode::Internal(slots) => {
                for slot in slots.iter() {
                    out.extend_from_slice(&slot.to_be_bytes());
                }
            }
            TrieNode::Leaf { key, value } => {
                self.key_type.write(key, out);
                self.leaf_type.write(value, out);
            }
        }
    }
}

fn as_internal<K, V>(node: &TrieNode<K, V>, pos: u64) -> Result<&[i64; SLOTS]> {
    match node {
        TrieNode::Internal(slots) => Ok(slots),
        TrieNode::Leaf { .. } => Err(Error::inconsistent(format!(
            "expected internal node at {}, found leaf",
            pos
        ))),
    }
}

fn as_leaf<K, V>(node: &TrieNode<K, V>, pos: u64) -> Result<(&K, &V)> {
    match node {
        TrieNode::Leaf { key, value } => Ok((key, value)),
        TrieNode::Internal(_) => Err(Error::inconsistent(format!(
            "expected leaf at {}, found internal node",
            pos
        ))),
    }
}

fn corrupt_terminal(node: u64) -> Error {
    Error::inconsistent(format!(
        "terminal slot of node {} holds a mismatched entry",
        node
    ))
}

/// An insert-only on-disk map from `KT::Key` to `LT::Value`.
pub struct ByteTrie<KT: KeyType, LT: LeafType> {
    file: StagedFile<TrieCodec<KT, LT>>,
    key_type: Arc<KT>,
    leaf_type: Arc<LT>,
}

impl<KT: KeyType, LT: LeafType> ByteTrie<KT, LT> {
    /// Opens the trie file at `path`, creating it with an empty root if needed.
    pub fn open(path: impl AsRef<Path>, key_type: KT, leaf_type: LT, config: &Config) -> Result<Self> {
        let key_type = Arc::new(key_type);
        let leaf_type = Arc::new(leaf_type);
        let codec = TrieCodec {
            key_type: Arc::clone(&key_type),
            leaf_type: Arc::clone(&leaf_type),
        };
        let mut file = StagedFile::open(path, codec, config)?;
        if file.is_empty() {
            let mut root = Vec::with_capacity(INTERNAL_NODE_SIZE as usize);
            file.codec()
                .encode(&TrieNode::Internal(Box::new([0i64; SLOTS])), &mut root);
            file.initialize(&root)?;
        }
        Ok(Self {
            file,
            key_type,
            leaf_type,
        })
    }

    pub fn key_type(&self) -> &KT {
        &self.key_type
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn slot(&mut self, node: u64, slot: usize) -> Result<Address> {
        let raw = as_internal(self.file.get(node, NodeKind::Internal)?, node)?[slot];
        Ok(Address::decode(raw))
    }

    /// Points `slot` of the internal node at `node` to `target`, copy-on-write.
    fn link(&mut self, node: u64, slot: usize, target: Address) -> Result<()> {
        self.file.modify(node, NodeKind::Internal, |record| match record {
            TrieNode::Internal(slots) => {
                slots[slot] = target.encode();
                Ok(())
            }
            TrieNode::Leaf { .. } => Err(Error::inconsistent(format!(
                "expected internal node at {}, found leaf",
                node
            ))),
        })
    }

    /// Looks up the value stored under `key`.
    pub fn get(&mut self, key: &KT::Key) -> Result<Option<LT::Value>> {
        self.key_type.validate(key)?;
        let bytes = self.key_type.to_bytes(key);
        let mut node = ROOT;
        let mut depth = 0;
        loop {
            let slot = slot_for(&bytes, depth);
            match self.slot(node, slot)? {
                Address::Null => return Ok(None),
                Address::Internal(_) if slot == TERMINAL => return Err(corrupt_terminal(node)),
                Address::Internal(pos) => {
                    node = pos;
                    depth += 1;
                }
                Address::Leaf(pos) => {
                    let (stored, value) = as_leaf(self.file.get(pos, NodeKind::Leaf)?, pos)?;
                    if self.key_type.keys_equal(stored, key) {
                        return Ok(Some(value.clone()));
                    }
                    if slot == TERMINAL {
                        return Err(corrupt_terminal(node));
                    }
                    return Ok(None);
                }
            }
        }
    }

    pub fn contains(&mut self, key: &KT::Key) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Inserts a new key. Fails with a duplicate key error if the key exists.
    pub fn put(&mut self, key: KT::Key, value: LT::Value) -> Result<()> {
        self.key_type.validate(&key)?;
        let bytes = self.key_type.to_bytes(&key);
        let mut node = ROOT;
        let mut depth = 0;
        loop {
            let slot = slot_for(&bytes, depth);
            match self.slot(node, slot)? {
                Address::Null => {
                    let size = self.key_type.size(&key) + self.leaf_type.size(&value);
                    let pos = self.file.allocate(size);
                    self.file.stage(pos, TrieNode::Leaf { key, value });
                    return self.link(node, slot, Address::Leaf(pos));
                }
                Address::Internal(_) if slot == TERMINAL => return Err(corrupt_terminal(node)),
                Address::Internal(pos) => {
                    node = pos;
                    depth += 1;
                }
                Address::Leaf(_) if slot == TERMINAL => return Err(Error::duplicate_key(&key)),
                Address::Leaf(pos) => {
                    let existing = {
                        let (stored, _) = as_leaf(self.file.get(pos, NodeKind::Leaf)?, pos)?;
                        if self.key_type.keys_equal(stored, &key) {
                            return Err(Error::duplicate_key(&key));
                        }
                        self.key_type.to_bytes(stored)
                    };
                    // Split: push the existing leaf one level down and retry from the new node.
                    let mut slots = Box::new([0i64; SLOTS]);
                    slots[slot_for(&existing, depth + 1)] = Address::Leaf(pos).encode();
                    let split = self.file.allocate(INTERNAL_NODE_SIZE);
                    self.file.stage(split, TrieNode::Internal(slots));
                    self.link(node, slot, Address::Internal(split))?;
                    node = split;
                    depth += 1;
                }
            }
        }
    }

    /// Unlinks `key`. The leaf's space is not reclaimed.
    pub fn delete(&mut self, key: &KT::Key) -> Result<bool> {
        self.key_type.validate(key)?;
        let bytes = self.key_type.to_bytes(key);
        let mut node = ROOT;
        let mut depth = 0;
        loop {
            let slot = slot_for(&bytes, depth);
            match self.slot(node, slot)? {
                Address::Null => return Ok(false),
                Address::Internal(_) if slot == TERMINAL => return Err(corrupt_terminal(node)),
                Address::Internal(pos) => {
                    node = pos;
                    depth += 1;
                }
                Address::Leaf(pos) => {
                    let matches = {
                        let (stored, _) = as_leaf(self.file.get(pos, NodeKind::Leaf)?, pos)?;
                        self.key_type.keys_equal(stored, key)
                    };
                    if matches {
                        self.link(node, slot, Address::Null)?;
                        return Ok(true);
                    }
                    if slot == TERMINAL {
                        return Err(corrupt_terminal(node));
                    }
                    return Ok(false);
                }
            }
        }
    }

    /// Flushes staged nodes to disk.
    pub fn commit(&mut self) -> Result<()> {
        let flushed = self.file.commit()?;
        debug!(path = %self.path().display(), flushed, "trie committed");
        Ok(())
    }

    /// Discards staged nodes.
    pub fn rollback(&mut self) {
        self.file.rollback();
    }

    /// Drops every cached node.
    pub fn clean_up(&mut self) {
        self.file.clean_up();
    }

    /// Drops cached nodes accessed fewer than `limit` times.
    pub fn clean_up_below(&mut self, limit: u32) {
        self.file.clean_up_below(limit);
    }

    pub fn close(&mut self) {
        self.file.close();
    }

    pub fn reopen(&mut self) -> Result<()> {
        self.file.reopen()
    }

    /// Deletes the trie file.
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

    #[cfg(test)]
    pub(crate) fn file_mut(&mut self) -> &mut StagedFile<TrieCodec<KT, LT>> {
        &mut self.file
    }
}
