//! Database facade
//!
//! The engine's public surface, consumed by external transport/CLI
//! layers.
//!
//! ## Responsibilities
//! - Run recovery synchronously before accepting any transaction
//! - Wire the WAL writer, storage manager, and transaction manager
//! - Own the background flusher thread in `SyncMode::Async`
//! - Checkpointing

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, tick, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use tracing::{error, info};

use crate::config::{Config, SyncMode};
use crate::error::Result;
use crate::recovery::{RecoveryManager, RecoveryReport};
use crate::storage::StorageManager;
use crate::txn::TransactionManager;
use crate::wal::{EntryKind, Lsn, TxnId, WalWriter};

/// A WAL-backed transactional key-value database.
///
/// ## Concurrency Model
///
/// - The WAL writer sits behind a `Mutex`; LSN allocation happens under
///   that lock, so LSN order is physical log order (the one
///   serialization point in the system)
/// - The storage map is behind a `RwLock`: `get` takes the read path,
///   commit application and recovery take the write path
/// - The transaction registry is behind its own `RwLock`; commit
///   releases it before the durability barrier so concurrent committers
///   can share a group-commit batch
pub struct Database {
    config: Config,
    wal: Arc<Mutex<WalWriter>>,
    storage: Arc<StorageManager>,
    txns: TransactionManager,
    recovery: RecoveryReport,
    flusher: Option<Flusher>,
}

/// Handle to the async-mode background sync thread
struct Flusher {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Database {
    /// Open or create log storage at `config.log_directory`.
    ///
    /// Recovery runs synchronously before this returns; no transaction
    /// is accepted against an unreplayed log.
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.log_directory)?;

        let storage = Arc::new(StorageManager::new());
        let recovery = RecoveryManager::run(&config.log_directory, &storage)?;

        let wal = Arc::new(Mutex::new(WalWriter::open(
            &config.log_directory,
            &config,
            recovery.last_lsn + 1,
        )?));

        let txns = TransactionManager::new(
            Arc::clone(&wal),
            Arc::clone(&storage),
            config.sync_mode,
            recovery.last_lsn,
        );

        let flusher = match config.sync_mode {
            SyncMode::Async { interval_ms } => {
                Some(Self::spawn_flusher(Arc::clone(&wal), interval_ms)?)
            }
            _ => None,
        };

        info!(
            dir = %config.log_directory.display(),
            keys = storage.len(),
            next_lsn = recovery.last_lsn + 1,
            "database open"
        );

        Ok(Self {
            config,
            wal,
            storage,
            txns,
            recovery,
            flusher,
        })
    }

    /// Open with a default config rooted at `path` (convenience)
    pub fn open_path(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::open(Config::builder().log_directory(path).build())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Start a transaction
    pub fn begin(&self) -> Result<TxnId> {
        self.txns.begin()
    }

    /// Buffer a write under `txn_id`
    pub fn put(&self, txn_id: TxnId, key: &str, value: &str) -> Result<()> {
        self.txns.put(txn_id, key, value)
    }

    /// Buffer a delete under `txn_id`; the key must exist in the
    /// transaction's view
    pub fn delete(&self, txn_id: TxnId, key: &str) -> Result<()> {
        self.txns.delete(txn_id, key)
    }

    /// Read committed state only
    pub fn get(&self, key: &str) -> Option<String> {
        self.storage.get(key)
    }

    /// Read through a transaction: its own uncommitted writes layered
    /// over committed state
    pub fn get_txn(&self, txn_id: TxnId, key: &str) -> Result<Option<String>> {
        self.txns.get(txn_id, key)
    }

    /// Commit `txn_id`. On success the transaction is durable per the
    /// configured sync mode and its effects are visible to `get`.
    pub fn commit(&self, txn_id: TxnId) -> Result<()> {
        self.txns.commit(txn_id)
    }

    /// Roll back `txn_id`, discarding its buffered effects
    pub fn rollback(&self, txn_id: TxnId) -> Result<()> {
        self.txns.rollback(txn_id)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Write a checkpoint entry recording how far effects have been
    /// applied, and sync it. Bounds future recovery reporting; never
    /// required for correctness.
    pub fn checkpoint(&self) -> Result<()> {
        let through_lsn = self.txns.last_applied_lsn();
        let mut wal = self.wal.lock();
        wal.append(TxnId::new(), EntryKind::Checkpoint { through_lsn })?;
        wal.sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// The log directory in use
    pub fn log_directory(&self) -> &std::path::Path {
        &self.config.log_directory
    }

    /// What recovery found when this database was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// The next LSN the writer will assign
    pub fn current_lsn(&self) -> Lsn {
        self.wal.lock().current_lsn()
    }

    /// Number of currently active transactions
    pub fn active_txn_count(&self) -> usize {
        self.txns.active_count()
    }

    /// Number of live keys in the storage manager
    pub fn key_count(&self) -> usize {
        self.storage.len()
    }

    /// The configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn spawn_flusher(wal: Arc<Mutex<WalWriter>>, interval_ms: u64) -> Result<Flusher> {
        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let ticker = tick(Duration::from_millis(interval_ms.max(1)));

        let handle = std::thread::Builder::new()
            .name("ledgerkv-flusher".to_string())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        if let Err(e) = wal.lock().sync() {
                            error!(error = %e, "background WAL sync failed");
                        }
                    }
                    recv(shutdown_rx) -> _ => break,
                }
            })?;

        Ok(Flusher { shutdown, handle })
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.take() {
            let _ = flusher.shutdown.send(());
            let _ = flusher.handle.join();
        }
        // Best-effort final sync; Drop cannot report failure
        if let Err(e) = self.wal.lock().sync() {
            error!(error = %e, "final WAL sync failed on close");
        }
    }
}
