//! Lock management for Strata.
//!
//! Tables and indexed columns are registered as lockable resources. A
//! transaction acquires all of its resources at once or none of them, so no
//! lock ordering is needed to avoid deadlock; contention is resolved by
//! retrying with a randomized sleep.

use crate::resources::Resources;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use strata_core::{Error, Result};
use tracing::{trace, warn};

/// Lock type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockType {
    /// Shared lock (read).
    Shared,
    /// Exclusive lock (write).
    Exclusive,
}

impl LockType {
    fn for_write(write: bool) -> Self {
        if write {
            LockType::Exclusive
        } else {
            LockType::Shared
        }
    }
}

/// Lock state for a resource.
#[derive(Clone, Debug, Default)]
struct LockState {
    /// Transactions holding shared locks.
    shared_holders: BTreeSet<u64>,
    /// Transaction holding exclusive lock (if any).
    exclusive_holder: Option<u64>,
}

impl LockState {
    fn can_grant(&self, tx_id: u64, lock_type: LockType) -> bool {
        match lock_type {
            LockType::Shared => {
                self.exclusive_holder.is_none() || self.exclusive_holder == Some(tx_id)
            }
            LockType::Exclusive => {
                self.exclusive_holder == Some(tx_id)
                    || (self.exclusive_holder.is_none()
                        && self.shared_holders.iter().all(|holder| *holder == tx_id))
            }
        }
    }

    fn grant(&mut self, tx_id: u64, lock_type: LockType) {
        match lock_type {
            LockType::Shared => {
                if self.exclusive_holder != Some(tx_id) {
                    self.shared_holders.insert(tx_id);
                }
            }
            LockType::Exclusive => {
                // Upgrade from shared if needed
                self.shared_holders.remove(&tx_id);
                self.exclusive_holder = Some(tx_id);
            }
        }
    }

    fn release(&mut self, tx_id: u64) {
        self.shared_holders.remove(&tx_id);
        if self.exclusive_holder == Some(tx_id) {
            self.exclusive_holder = None;
        }
    }
}

/// Lock manager for managing resource locks.
#[derive(Default)]
pub struct LockManager {
    /// Locks by resource id.
    locks: Mutex<HashMap<String, LockState>>,
}

impl LockManager {
    /// Creates a new lock manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a resource lockable.
    pub fn register(&self, resource: &str) {
        self.locks.lock().entry(resource.to_string()).or_default();
    }

    /// Removes a resource, e.g. after its table is dropped.
    pub fn remove(&self, resource: &str) {
        self.locks.lock().remove(resource);
    }

    /// Registers exactly the given resources, dropping every other one.
    pub fn sync<S: AsRef<str>>(&self, resources: &[S]) {
        let mut locks = self.locks.lock();
        let ids: BTreeSet<&str> = resources.iter().map(AsRef::as_ref).collect();
        locks.retain(|id, _| ids.contains(id.as_str()));
        for id in ids {
            locks.entry(id.to_string()).or_default();
        }
    }

    pub fn is_registered(&self, resource: &str) -> bool {
        self.locks.lock().contains_key(resource)
    }

    /// Acquires every resource or none of them, without blocking.
    pub fn try_lock(&self, resources: &Resources, tx_id: u64) -> Result<bool> {
        let mut locks = self.locks.lock();
        for resource in resources.iter() {
            let state = locks.get(resource.id()).ok_or_else(|| {
                Error::invalid_operation(format!("unknown lock resource '{}'", resource.id()))
            })?;
            if !state.can_grant(tx_id, LockType::for_write(resource.is_write())) {
                return Ok(false);
            }
        }
        for resource in resources.iter() {
            if let Some(state) = locks.get_mut(resource.id()) {
                state.grant(tx_id, LockType::for_write(resource.is_write()));
            }
        }
        Ok(true)
    }

    /// Acquires every resource, retrying with a random sleep below `retry_ms`
    /// until granted or `cancel` is set.
    pub fn lock(
        &self,
        resources: &Resources,
        tx_id: u64,
        cancel: &AtomicBool,
        retry_ms: u64,
    ) -> Result<()> {
        let mut rng = rand::thread_rng();
        let mut attempts = 0u64;
        loop {
            if cancel.load(Ordering::Acquire) {
                warn!(tx_id, attempts, "lock acquisition cancelled");
                return Err(Error::cancelled(format!(
                    "transaction {} cancelled while waiting for locks",
                    tx_id
                )));
            }
            if self.try_lock(resources, tx_id)? {
                return Ok(());
            }
            attempts += 1;
            let sleep_ms = rng.gen_range(0..retry_ms.max(1));
            trace!(tx_id, attempts, sleep_ms, "locks busy, retrying");
            thread::sleep(Duration::from_millis(sleep_ms));
        }
    }

    /// Releases the given resources held by a transaction.
    pub fn unlock(&self, resources: &Resources, tx_id: u64) {
        let mut locks = self.locks.lock();
        for resource in resources.iter() {
            if let Some(state) = locks.get_mut(resource.id()) {
                state.release(tx_id);
            }
        }
    }

    /// Checks if a transaction holds a lock on a resource.
    pub fn holds_lock(&self, resource: &str, tx_id: u64) -> bool {
        self.locks.lock().get(resource).map_or(false, |state| {
            state.shared_holders.contains(&tx_id) || state.exclusive_holder == Some(tx_id)
        })
    }

    /// Checks if a transaction holds an exclusive lock on a resource.
    pub fn holds_exclusive(&self, resource: &str, tx_id: u64) -> bool {
        self.locks
            .lock()
            .get(resource)
            .map_or(false, |state| state.exclusive_holder == Some(tx_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Resource;
    use std::sync::Arc;
    use std::time::Instant;

    fn manager(ids: &[&str]) -> LockManager {
        let lm = LockManager::new();
        lm.sync(ids);
        lm
    }

    fn reads(ids: &[&str]) -> Resources {
        ids.iter().map(|id| Resource::read(*id)).collect()
    }

    fn writes(ids: &[&str]) -> Resources {
        ids.iter().map(|id| Resource::write(*id)).collect()
    }

    #[test]
    fn test_multiple_shared_locks() {
        let lm = manager(&["t1"]);
        assert!(lm.try_lock(&reads(&["t1"]), 1).unwrap());
        assert!(lm.try_lock(&reads(&["t1"]), 2).unwrap());
        assert!(lm.holds_lock("t1", 1));
        assert!(lm.holds_lock("t1", 2));
    }

    #[test]
    fn test_exclusive_blocks_shared() {
        let lm = manager(&["t1"]);
        assert!(lm.try_lock(&writes(&["t1"]), 1).unwrap());
        assert!(lm.holds_exclusive("t1", 1));
        assert!(!lm.try_lock(&reads(&["t1"]), 2).unwrap());
        assert!(!lm.try_lock(&writes(&["t1"]), 2).unwrap());
    }

    #[test]
    fn test_shared_blocks_exclusive() {
        let lm = manager(&["t1"]);
        assert!(lm.try_lock(&reads(&["t1"]), 1).unwrap());
        assert!(!lm.try_lock(&writes(&["t1"]), 2).unwrap());
        // upgrade by the only reader
        assert!(lm.try_lock(&writes(&["t1"]), 1).unwrap());
        assert!(lm.holds_exclusive("t1", 1));
    }

    #[test]
    fn test_all_or_nothing() {
        let lm = manager(&["a", "b"]);
        assert!(lm.try_lock(&writes(&["b"]), 1).unwrap());
        assert!(!lm.try_lock(&writes(&["a", "b"]), 2).unwrap());
        assert!(!lm.holds_lock("a", 2));

        lm.unlock(&writes(&["b"]), 1);
        assert!(lm.try_lock(&writes(&["a", "b"]), 2).unwrap());
        assert!(lm.holds_exclusive("a", 2));
        assert!(lm.holds_exclusive("b", 2));
    }

    #[test]
    fn test_unknown_resource() {
        let lm = manager(&["a"]);
        let err = lm.try_lock(&reads(&["missing"]), 1).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn test_register_remove_sync() {
        let lm = LockManager::new();
        lm.register("a");
        lm.register("b");
        assert!(lm.is_registered("a"));
        lm.remove("a");
        assert!(!lm.is_registered("a"));

        lm.sync(&["c".to_string(), "b".to_string()]);
        assert!(lm.is_registered("b"));
        assert!(lm.is_registered("c"));
        lm.sync(&["c"]);
        assert!(!lm.is_registered("b"));
    }

    #[test]
    fn test_lock_cancelled() {
        let lm = manager(&["t"]);
        assert!(lm.try_lock(&writes(&["t"]), 1).unwrap());
        let cancel = AtomicBool::new(true);
        let err = lm.lock(&writes(&["t"]), 2, &cancel, 1).unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[test]
    fn test_lock_waits_for_release() {
        let lm = Arc::new(manager(&["t"]));
        assert!(lm.try_lock(&writes(&["t"]), 1).unwrap());

        let waiter = {
            let lm = Arc::clone(&lm);
            thread::spawn(move || {
                let cancel = AtomicBool::new(false);
                lm.lock(&writes(&["t"]), 2, &cancel, 2)
            })
        };
        let start = Instant::now();
        thread::sleep(Duration::from_millis(20));
        lm.unlock(&writes(&["t"]), 1);

        waiter.join().unwrap().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(lm.holds_exclusive("t", 2));
    }
}
