//! Configuration for Strata indexes and transactions.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Engine configuration.
///
/// Every field has a default, so a partial document deserializes cleanly.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the database files.
    pub data_dir: PathBuf,
    /// Whether commits `fsync` index files after flushing pending nodes.
    pub sync_on_commit: bool,
    /// Size of the durable node cache above which a commit triggers eviction.
    pub max_cached_nodes: usize,
    /// Cached nodes accessed fewer times than this are evicted.
    pub cache_eviction_threshold: u32,
    /// Upper bound in milliseconds of the randomized sleep between lock attempts.
    pub lock_retry_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sync_on_commit: false,
            max_cached_nodes: 100_000,
            cache_eviction_threshold: 2,
            lock_retry_ms: 10,
        }
    }
}

impl Config {
    /// Sets the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Sets whether commits sync to disk.
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Sets the maximum lock retry sleep.
    pub fn with_lock_retry_ms(mut self, ms: u64) -> Self {
        self.lock_retry_ms = ms;
        self
    }

    /// Sets the cache eviction policy.
    pub fn with_cache_limits(mut self, max_cached_nodes: usize, threshold: u32) -> Self {
        self.max_cached_nodes = max_cached_nodes;
        self.cache_eviction_threshold = threshold;
        self
    }

    /// Directory holding all index files.
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    /// Base path of the index `index` on table `table`.
    pub fn index_path(&self, table: &str, index: &str) -> PathBuf {
        self.index_dir().join(format!("{}.{}", table, index))
    }

    /// Returns the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.sync_on_commit);
        assert_eq!(config.lock_retry_ms, 10);
        assert_eq!(config.index_dir(), PathBuf::from("data").join("index"));
    }

    #[test]
    fn test_index_path() {
        let config = Config::default().with_data_dir("/var/strata");
        assert_eq!(
            config.index_path("users", "email"),
            PathBuf::from("/var/strata/index/users.email")
        );
    }

    #[test]
    fn test_partial_deserialize() {
        let config: Config =
            serde_json::from_str(r#"{"data_dir": "/tmp/db", "lock_retry_ms": 25}"#).unwrap();
        assert_eq!(config.data_dir(), Path::new("/tmp/db"));
        assert_eq!(config.lock_retry_ms, 25);
        assert_eq!(config.max_cached_nodes, 100_000);
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_sync_on_commit(true)
            .with_lock_retry_ms(1)
            .with_cache_limits(10, 5);
        assert!(config.sync_on_commit);
        assert_eq!(config.lock_retry_ms, 1);
        assert_eq!(config.max_cached_nodes, 10);
        assert_eq!(config.cache_eviction_threshold, 5);
    }
}
