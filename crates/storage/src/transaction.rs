//! Transaction coordination for Strata indexes.
//!
//! A transaction locks its resources up front, lets the caller stage index
//! mutations, and then commits or rolls back every participating index.
//! Commits run index by index; there is no cross-index atomicity.

use crate::lock::LockManager;
use crate::resources::Resources;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::{Config, Error, Result};
use strata_index::Index;
use tracing::{debug, error, warn};

/// Global transaction ID counter.
static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction ID type.
pub type TransactionId = u64;

/// Transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction holds its locks and may stage changes.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// A transaction over a set of locked resources.
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    lock_manager: Arc<LockManager>,
    resources: Resources,
}

impl Transaction {
    /// Starts a transaction, blocking until every resource is locked or
    /// `cancel` is set.
    pub fn begin(
        lock_manager: Arc<LockManager>,
        resources: Resources,
        config: &Config,
        cancel: &AtomicBool,
    ) -> Result<Self> {
        let id = NEXT_TX_ID.fetch_add(1, Ordering::SeqCst);
        lock_manager.lock(&resources, id, cancel, config.lock_retry_ms)?;
        debug!(tx_id = id, resources = resources.len(), "transaction started");
        Ok(Self {
            id,
            state: TransactionState::Active,
            lock_manager,
            resources,
        })
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true if the transaction is active.
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    fn check_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::invalid_operation(format!(
                "transaction {} is not active",
                self.id
            )));
        }
        Ok(())
    }

    /// Commits every index in order.
    ///
    /// On the first failure the failing index and all later ones are rolled
    /// back and the error is returned; earlier indexes stay committed.
    pub fn commit(mut self, indexes: &mut [&mut dyn Index]) -> Result<()> {
        self.check_active()?;
        for i in 0..indexes.len() {
            if let Err(err) = indexes[i].commit() {
                error!(
                    tx_id = self.id,
                    index = i,
                    severity = ?err.severity(),
                    error = %err,
                    "index commit failed, rolling back"
                );
                for index in indexes[i..].iter_mut() {
                    index.rollback();
                }
                self.finish(TransactionState::RolledBack);
                return Err(err);
            }
        }
        self.finish(TransactionState::Committed);
        debug!(tx_id = self.id, indexes = indexes.len(), "transaction committed");
        Ok(())
    }

    /// Discards staged changes of every index and releases the locks.
    pub fn rollback(mut self, indexes: &mut [&mut dyn Index]) {
        for index in indexes.iter_mut() {
            index.rollback();
        }
        self.finish(TransactionState::RolledBack);
        debug!(tx_id = self.id, indexes = indexes.len(), "transaction rolled back");
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.lock_manager.unlock(&self.resources, self.id);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            warn!(tx_id = self.id, "transaction dropped while active, releasing locks");
            self.finish(TransactionState::RolledBack);
        }
    }
}
