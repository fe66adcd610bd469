//! Recovery Manager
//!
//! Rebuilds correct storage state after an unclean shutdown, using only
//! the log.
//!
//! ## Algorithm
//! 1. Scan all entries via the WAL reader, stopping at the first
//!    corrupted or truncated frame
//! 2. Analysis: collect the set of transaction ids with a `Commit` entry
//! 3. REDO (ascending LSN): apply every `Put`/`Delete` of a committed
//!    transaction
//! 4. UNDO (descending LSN): reverse every `Put`/`Delete` of a
//!    transaction with no commit, guarded by the record's LSN so only
//!    writes that were actually applied get reversed
//!
//! Both passes are idempotent; crashing during recovery and retrying
//! from scratch is safe.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{LedgerError, Result};
use crate::storage::StorageManager;
use crate::wal::{EntryKind, LogEntry, Lsn, TxnId, WalReader};

/// Drives the scan / analysis / REDO / UNDO passes at startup
pub struct RecoveryManager;

/// What recovery found and did
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Valid entries scanned across all segments
    pub entries_scanned: u64,

    /// Transactions with a durable commit entry
    pub committed_txns: usize,

    /// Transactions with no terminal entry (treated as never happened)
    pub incomplete_txns: usize,

    /// Mutations applied during REDO
    pub entries_redone: u64,

    /// Mutations of incomplete transactions reversed during UNDO
    pub entries_undone: u64,

    /// Highest LSN seen; new LSNs continue after this
    pub last_lsn: Lsn,

    /// Whether the scan stopped early at a corrupted or truncated tail
    pub truncated_tail: bool,

    /// `through_lsn` of the most recent checkpoint entry, if any
    pub last_checkpoint: Option<Lsn>,
}

impl RecoveryManager {
    /// Run recovery against `storage` from the log in `dir`.
    ///
    /// Runs once at startup, before any new transaction is accepted. An
    /// unreadable log is fatal to opening the database; a corrupted tail
    /// is not (trust is truncated at that point).
    pub fn run(dir: &Path, storage: &StorageManager) -> Result<RecoveryReport> {
        // Scan. Tail corruption ends the scan silently; a real read
        // failure must fail the open instead of being mistaken for one.
        let reader = WalReader::open(dir)
            .map_err(|e| LedgerError::Recovery(format!("cannot open log: {}", e)))?;
        let mut iter = reader.entries();
        let entries: Vec<LogEntry> = iter.by_ref().collect();
        if let Some(msg) = iter.io_error() {
            return Err(LedgerError::Recovery(format!("log unreadable: {}", msg)));
        }

        let mut report = RecoveryReport {
            entries_scanned: iter.entries_read(),
            last_lsn: iter.last_lsn(),
            truncated_tail: iter.truncated(),
            ..RecoveryReport::default()
        };

        // Analysis: commit markers decide which transactions happened.
        let mut committed: HashSet<TxnId> = HashSet::new();
        let mut seen: HashSet<TxnId> = HashSet::new();
        for entry in &entries {
            match &entry.kind {
                EntryKind::Commit => {
                    committed.insert(entry.txn_id);
                }
                EntryKind::Rollback => {
                    // Mutually exclusive with commit per transaction by
                    // construction; removal is defensive.
                    committed.remove(&entry.txn_id);
                }
                EntryKind::Checkpoint { through_lsn } => {
                    // Not part of any transaction's lifetime
                    report.last_checkpoint = Some(*through_lsn);
                    continue;
                }
                _ => {}
            }
            seen.insert(entry.txn_id);
        }
        report.committed_txns = committed.len();
        report.incomplete_txns = seen.len().saturating_sub(committed.len());

        // REDO ascending: every durable committed effect becomes present,
        // whether or not the original in-process application happened.
        for entry in &entries {
            if !committed.contains(&entry.txn_id) {
                continue;
            }
            match &entry.kind {
                EntryKind::Put { key, new_value, .. } => {
                    storage.put(key.clone(), new_value.clone(), entry.lsn);
                    report.entries_redone += 1;
                }
                EntryKind::Delete { key, .. } => {
                    storage.delete(key, entry.lsn);
                    report.entries_redone += 1;
                }
                _ => {}
            }
        }

        // UNDO descending: reverse partially-applied work of incomplete
        // transactions. The storage manager's LSN guard makes the first
        // revert on a key a no-op unless that exact write is
        // materialized; once a key's tail write has been reverted, the
        // remaining earlier writes on that key restore unconditionally,
        // so the chain walks back to the pre-transaction image even when
        // other transactions' entries sit between its steps.
        let mut reverted_keys: HashSet<String> = HashSet::new();
        for entry in entries.iter().rev() {
            if committed.contains(&entry.txn_id) {
                continue;
            }
            let (key, old_value) = match &entry.kind {
                EntryKind::Put { key, old_value, .. } => (key, old_value.as_deref()),
                EntryKind::Delete { key, old_value } => (key, Some(old_value.as_str())),
                _ => continue,
            };
            if reverted_keys.contains(key) {
                storage.restore(key, old_value, entry.lsn.saturating_sub(1));
                report.entries_undone += 1;
            } else if storage.revert(key, entry.lsn, old_value) {
                reverted_keys.insert(key.clone());
                report.entries_undone += 1;
            }
        }

        if report.truncated_tail {
            warn!(
                last_lsn = report.last_lsn,
                "log tail truncated or corrupted; trailing entries discarded"
            );
        }
        info!(
            entries = report.entries_scanned,
            committed = report.committed_txns,
            incomplete = report.incomplete_txns,
            redone = report.entries_redone,
            undone = report.entries_undone,
            last_lsn = report.last_lsn,
            "recovery complete"
        );

        Ok(report)
    }
}
