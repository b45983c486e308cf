//! Index statistics for Strata.
//!
//! Snapshots of file sizes and node counts, serialized for the monitoring endpoint.

use serde::Serialize;

/// Statistics for a trie or dense index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Size of the index file in bytes.
    pub file_size: u64,
    /// Committed nodes held in the cache.
    pub in_memory_nodes: usize,
    /// Nodes staged by the current transaction.
    pub pending_nodes: usize,
}

/// Statistics for a multi-value index: its trie plus its chain file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiIndexStats {
    pub file_size: u64,
    pub in_memory_nodes: usize,
    pub pending_nodes: usize,
    pub chain_file_size: u64,
    pub chain_in_memory_nodes: usize,
    pub chain_pending_nodes: usize,
}

impl MultiIndexStats {
    pub(crate) fn new(trie: IndexStats, chain: IndexStats) -> Self {
        Self {
            file_size: trie.file_size,
            in_memory_nodes: trie.in_memory_nodes,
            pending_nodes: trie.pending_nodes,
            chain_file_size: chain.file_size,
            chain_in_memory_nodes: chain.in_memory_nodes,
            chain_pending_nodes: chain.pending_nodes,
        }
    }

    /// Total bytes on disk across both files.
    pub fn total_file_size(&self) -> u64 {
        self.file_size + self.chain_file_size
    }
}

/// Stats of any table index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatsReport {
    Unique(IndexStats),
    Multi(MultiIndexStats),
}

impl StatsReport {
    /// Staged nodes across all files of the index.
    pub fn pending_nodes(&self) -> usize {
        match self {
            StatsReport::Unique(stats) => stats.pending_nodes,
            StatsReport::Multi(stats) => stats.pending_nodes + stats.chain_pending_nodes,
        }
    }
}
