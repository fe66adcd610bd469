//! # LedgerKV
//!
//! A transactional key-value durability engine with:
//! - Write-Ahead Logging (WAL) with CRC32 framing and segment rotation
//! - Transactions with begin/put/delete/commit/rollback and
//!   read-your-writes isolation
//! - Configurable durability: per-commit fsync, timed background fsync,
//!   or group commit
//! - Crash recovery with analysis, REDO, and UNDO passes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                             │
//! │            (open runs recovery before anything)             │
//! └────────────┬───────────────────────────┬────────────────────┘
//!              │                           │
//! ┌────────────▼────────────┐   ┌──────────▼──────────┐
//! │   Transaction Manager   │   │  Recovery Manager   │
//! │  (begin/put/delete/     │   │  (scan, analysis,   │
//! │   commit/rollback)      │   │   REDO, UNDO)       │
//! └──────┬──────────┬───────┘   └─────┬────────┬──────┘
//!        │          │                 │        │
//! ┌──────▼──────┐ ┌─▼─────────────────▼──┐ ┌───▼─────────┐
//! │ WAL Writer  │ │   Storage Manager    │ │ WAL Reader  │
//! │ (append,    │ │  (RwLock'd records,  │ │ (multi-     │
//! │  fsync,     │ │   applied only after │ │  segment    │
//! │  rotation)  │ │   durable commit)    │ │  scan)      │
//! └─────────────┘ └──────────────────────┘ └─────────────┘
//! ```
//!
//! The log is the sole source of truth; the storage manager is a
//! materialized cache of committed log content, rebuilt on every open.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod db;
pub mod recovery;
pub mod storage;
pub mod txn;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, SyncMode};
pub use db::Database;
pub use error::{LedgerError, Result};
pub use recovery::{RecoveryManager, RecoveryReport};
pub use storage::StorageManager;
pub use txn::TransactionManager;
pub use wal::{EntryKind, LogEntry, Lsn, TxnId};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LedgerKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
