//! TransactionManager implementation
//!
//! Coordinates the registry of active transactions with the WAL writer
//! (durability) and the storage manager (effects on commit).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config::SyncMode;
use crate::error::{LedgerError, Result};
use crate::storage::StorageManager;
use crate::wal::{CommitBarrier, EntryKind, Lsn, TxnId, WalWriter};

use super::transaction::{Transaction, TxnStatus};

/// Coordinates client-visible transactions.
///
/// Operations are logged WAL-first; effects reach the storage manager
/// only after the commit entry has passed the durability barrier for the
/// configured sync mode. Rolled-back transactions never touch storage.
pub struct TransactionManager {
    wal: Arc<Mutex<WalWriter>>,
    storage: Arc<StorageManager>,
    sync_mode: SyncMode,

    /// Group-commit barrier; present only in Batch mode
    barrier: Option<CommitBarrier>,

    /// Transactions currently accepting operations
    active: RwLock<HashMap<TxnId, Transaction>>,

    /// Terminal statuses of finalized transactions, kept so late callers
    /// get `TransactionFinalized` instead of `UnknownTransaction`
    finalized: RwLock<HashMap<TxnId, TxnStatus>>,

    /// Highest LSN whose effect has been applied to the storage manager
    last_applied: AtomicU64,
}

impl TransactionManager {
    pub fn new(
        wal: Arc<Mutex<WalWriter>>,
        storage: Arc<StorageManager>,
        sync_mode: SyncMode,
        last_applied: Lsn,
    ) -> Self {
        let barrier = match sync_mode {
            SyncMode::Batch {
                max_entries,
                max_wait_ms,
            } => Some(CommitBarrier::new(max_entries, max_wait_ms)),
            _ => None,
        };

        Self {
            wal,
            storage,
            sync_mode,
            barrier,
            active: RwLock::new(HashMap::new()),
            finalized: RwLock::new(HashMap::new()),
            last_applied: AtomicU64::new(last_applied),
        }
    }

    /// Start a transaction: mint an id, log `Begin`, register as Active
    pub fn begin(&self) -> Result<TxnId> {
        let txn_id = TxnId::new();
        self.wal.lock().append(txn_id, EntryKind::Begin)?;
        self.active.write().insert(txn_id, Transaction::new(txn_id));
        debug!(txn = %txn_id, "transaction started");
        Ok(txn_id)
    }

    /// Buffer a write. The pre-image is captured through the
    /// transaction's own overlay first, then committed state.
    pub fn put(&self, txn_id: TxnId, key: &str, value: &str) -> Result<()> {
        let mut active = self.active.write();
        let txn = match active.get_mut(&txn_id) {
            Some(t) => t,
            None => return Err(self.rejection(txn_id)),
        };
        if !txn.is_active() {
            return Err(LedgerError::TransactionFinalized(txn_id));
        }

        let old_value = match txn.overlay_get(key) {
            Some(pending) => pending.map(str::to_string),
            None => self.storage.get(key),
        };

        let entry = self.wal.lock().append(
            txn_id,
            EntryKind::Put {
                key: key.to_string(),
                old_value,
                new_value: value.to_string(),
            },
        )?;
        txn.record_op(entry);
        Ok(())
    }

    /// Buffer a delete. The key must currently exist through the
    /// transaction's view; the pre-image rides in the entry for UNDO.
    pub fn delete(&self, txn_id: TxnId, key: &str) -> Result<()> {
        let mut active = self.active.write();
        let txn = match active.get_mut(&txn_id) {
            Some(t) => t,
            None => return Err(self.rejection(txn_id)),
        };
        if !txn.is_active() {
            return Err(LedgerError::TransactionFinalized(txn_id));
        }

        let old_value = match txn.overlay_get(key) {
            Some(Some(v)) => v.to_string(),
            Some(None) => return Err(LedgerError::KeyNotFound(key.to_string())),
            None => self
                .storage
                .get(key)
                .ok_or_else(|| LedgerError::KeyNotFound(key.to_string()))?,
        };

        let entry = self.wal.lock().append(
            txn_id,
            EntryKind::Delete {
                key: key.to_string(),
                old_value,
            },
        )?;
        txn.record_op(entry);
        Ok(())
    }

    /// Read a key through a transaction: its own uncommitted writes
    /// layered over committed state
    pub fn get(&self, txn_id: TxnId, key: &str) -> Result<Option<String>> {
        let active = self.active.read();
        let txn = match active.get(&txn_id) {
            Some(t) => t,
            None => return Err(self.rejection(txn_id)),
        };
        match txn.overlay_get(key) {
            Some(pending) => Ok(pending.map(str::to_string)),
            None => Ok(self.storage.get(key)),
        }
    }

    /// Commit: log the `Commit` entry, run the durability barrier, then
    /// apply buffered effects to the storage manager.
    ///
    /// The barrier is the durability point; it completes before this call
    /// returns success. Append or sync failure here is a hard failure:
    /// the transaction's outcome is decided by the log, not by this
    /// process's memory.
    pub fn commit(&self, txn_id: TxnId) -> Result<()> {
        let mut txn = {
            let mut active = self.active.write();
            let txn = match active.remove(&txn_id) {
                Some(t) => t,
                None => return Err(self.rejection(txn_id)),
            };
            // Commit entry is appended under the registry lock so no
            // operation of this transaction can slip in after it.
            if let Err(e) = self.wal.lock().append(txn_id, EntryKind::Commit) {
                self.finalized.write().insert(txn_id, TxnStatus::Aborted);
                return Err(e);
            }
            txn
        };

        // Durability point. Registry lock is released so concurrent
        // committers can share a batch.
        if let Err(e) = self.durability_barrier() {
            self.finalized.write().insert(txn_id, TxnStatus::Aborted);
            return Err(e);
        }

        // Apply effects. Commit success no longer depends on anything
        // below reaching disk; REDO reconstructs it if we crash here.
        for entry in txn.ops() {
            match &entry.kind {
                EntryKind::Put { key, new_value, .. } => {
                    self.storage.put(key.clone(), new_value.clone(), entry.lsn);
                }
                EntryKind::Delete { key, .. } => {
                    self.storage.delete(key, entry.lsn);
                }
                _ => {}
            }
            self.last_applied.fetch_max(entry.lsn, Ordering::SeqCst);
        }

        txn.mark_committed();
        debug!(txn = %txn_id, ops = txn.ops().len(), "transaction committed");
        self.finalized.write().insert(txn_id, txn.status());
        Ok(())
    }

    /// Roll back: log the `Rollback` entry and discard buffered effects.
    /// Storage is never touched; nothing was applied before commit.
    pub fn rollback(&self, txn_id: TxnId) -> Result<()> {
        let mut txn = {
            let mut active = self.active.write();
            let txn = match active.remove(&txn_id) {
                Some(t) => t,
                None => return Err(self.rejection(txn_id)),
            };
            if let Err(e) = self.wal.lock().append(txn_id, EntryKind::Rollback) {
                self.finalized.write().insert(txn_id, TxnStatus::Aborted);
                return Err(e);
            }
            txn
        };

        txn.mark_aborted();
        debug!(txn = %txn_id, ops = txn.ops().len(), "transaction rolled back");
        self.finalized.write().insert(txn_id, txn.status());
        Ok(())
    }

    /// Block until the configured durability policy covers the bytes
    /// appended so far
    fn durability_barrier(&self) -> Result<()> {
        match self.sync_mode {
            SyncMode::Sync => self.wal.lock().sync(),
            // The flusher thread owns the sync cadence; commits do not wait.
            SyncMode::Async { .. } => Ok(()),
            SyncMode::Batch { .. } => match &self.barrier {
                Some(barrier) => barrier.wait(&self.wal),
                None => self.wal.lock().sync(),
            },
        }
    }

    /// The right rejection for an id that is not in the active registry
    fn rejection(&self, txn_id: TxnId) -> LedgerError {
        if self.finalized.read().contains_key(&txn_id) {
            LedgerError::TransactionFinalized(txn_id)
        } else {
            LedgerError::UnknownTransaction(txn_id)
        }
    }

    // =========================================================================
    // Accessors (for testing and the database facade)
    // =========================================================================

    /// Number of transactions currently active
    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Highest LSN applied to the storage manager
    pub fn last_applied_lsn(&self) -> Lsn {
        self.last_applied.load(Ordering::SeqCst)
    }
}
