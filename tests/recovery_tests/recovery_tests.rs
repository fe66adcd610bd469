//! Tests for crash recovery
//!
//! Logs are crafted frame-by-frame so every crash shape is exact: missing
//! commit entries, corrupted tails, partially-applied uncommitted work.
//!
//! These tests verify:
//! - Analysis classifies committed vs incomplete transactions
//! - REDO materializes every durable committed effect
//! - UNDO reverses only writes that were actually applied
//! - Recovery is idempotent and safe to re-run

use std::fs::File;
use std::io::Write;

use ledgerkv::wal::{EntryKind, LogEntry, TxnId};
use ledgerkv::{RecoveryManager, StorageManager};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn put(key: &str, old: Option<&str>, new: &str) -> EntryKind {
    EntryKind::Put {
        key: key.to_string(),
        old_value: old.map(str::to_string),
        new_value: new.to_string(),
    }
}

fn delete(key: &str, old: &str) -> EntryKind {
    EntryKind::Delete {
        key: key.to_string(),
        old_value: old.to_string(),
    }
}

fn write_segment(dir: &TempDir, number: u64, entries: &[LogEntry]) {
    let path = dir.path().join(format!("wal-{:010}.log", number));
    let mut file = File::create(path).unwrap();
    for entry in entries {
        file.write_all(&entry.encode().unwrap()).unwrap();
    }
    file.sync_all().unwrap();
}

fn entry(lsn: u64, txn: TxnId, kind: EntryKind) -> LogEntry {
    LogEntry::new(lsn, txn, kind)
}

// =============================================================================
// Empty / Clean Logs
// =============================================================================

#[test]
fn test_recover_empty_directory() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::new();

    let report = RecoveryManager::run(temp.path(), &storage).unwrap();

    assert_eq!(report.entries_scanned, 0);
    assert_eq!(report.last_lsn, 0);
    assert!(!report.truncated_tail);
    assert!(storage.is_empty());
}

#[test]
fn test_recover_committed_transaction() {
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t, EntryKind::Begin),
            entry(2, t, put("a", None, "1")),
            entry(3, t, put("b", None, "2")),
            entry(4, t, EntryKind::Commit),
        ],
    );

    let storage = StorageManager::new();
    let report = RecoveryManager::run(temp.path(), &storage).unwrap();

    assert_eq!(report.committed_txns, 1);
    assert_eq!(report.incomplete_txns, 0);
    assert_eq!(report.entries_redone, 2);
    assert_eq!(report.last_lsn, 4);
    assert_eq!(storage.get("a"), Some("1".to_string()));
    assert_eq!(storage.get("b"), Some("2".to_string()));
}

// =============================================================================
// Atomicity: Incomplete Transactions Never Happened
// =============================================================================

#[test]
fn test_incomplete_transaction_has_no_effect() {
    // Crash hit between the last put and the commit entry
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t, EntryKind::Begin),
            entry(2, t, put("a", None, "1")),
            entry(3, t, put("b", None, "2")),
        ],
    );

    let storage = StorageManager::new();
    let report = RecoveryManager::run(temp.path(), &storage).unwrap();

    assert_eq!(report.committed_txns, 0);
    assert_eq!(report.incomplete_txns, 1);
    assert_eq!(report.entries_redone, 0);
    assert!(storage.is_empty());
}

#[test]
fn test_no_partial_effect_at_any_crash_point() {
    // Truncate the log after every prefix of the transaction; no prefix
    // short of the commit entry may leave any effect
    let t = TxnId::new();
    let entries = [
        entry(1, t, EntryKind::Begin),
        entry(2, t, put("a", None, "1")),
        entry(3, t, put("b", None, "2")),
        entry(4, t, delete("a", "1")),
        entry(5, t, EntryKind::Commit),
    ];

    for crash_after in 0..entries.len() {
        let temp = TempDir::new().unwrap();
        write_segment(&temp, 1, &entries[..=crash_after]);

        let storage = StorageManager::new();
        RecoveryManager::run(temp.path(), &storage).unwrap();

        if crash_after < entries.len() - 1 {
            assert!(
                storage.is_empty(),
                "crash after entry {} leaked partial state",
                crash_after
            );
        } else {
            assert_eq!(storage.get("a"), None);
            assert_eq!(storage.get("b"), Some("2".to_string()));
        }
    }
}

#[test]
fn test_rolled_back_transaction_has_no_effect() {
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t, EntryKind::Begin),
            entry(2, t, put("a", None, "1")),
            entry(3, t, EntryKind::Rollback),
        ],
    );

    let storage = StorageManager::new();
    let report = RecoveryManager::run(temp.path(), &storage).unwrap();

    assert_eq!(report.committed_txns, 0);
    assert!(storage.is_empty());
}

// =============================================================================
// Interleaved Transactions
// =============================================================================

#[test]
fn test_interleaved_commit_and_incomplete() {
    let temp = TempDir::new().unwrap();
    let t1 = TxnId::new();
    let t2 = TxnId::new();
    let t3 = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t1, EntryKind::Begin),
            entry(2, t2, EntryKind::Begin),
            entry(3, t1, put("a", None, "t1")),
            entry(4, t2, put("b", None, "t2")),
            entry(5, t3, EntryKind::Begin),
            entry(6, t1, EntryKind::Commit),
            entry(7, t3, put("c", None, "t3")),
            entry(8, t2, EntryKind::Commit),
            // t3 never commits
        ],
    );

    let storage = StorageManager::new();
    let report = RecoveryManager::run(temp.path(), &storage).unwrap();

    assert_eq!(report.committed_txns, 2);
    assert_eq!(report.incomplete_txns, 1);
    assert_eq!(storage.get("a"), Some("t1".to_string()));
    assert_eq!(storage.get("b"), Some("t2".to_string()));
    assert_eq!(storage.get("c"), None);
}

#[test]
fn test_redo_applies_in_lsn_order() {
    // Two committed transactions write the same key; the later LSN wins
    let temp = TempDir::new().unwrap();
    let t1 = TxnId::new();
    let t2 = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t1, put("k", None, "first")),
            entry(2, t2, put("k", Some("first"), "second")),
            entry(3, t1, EntryKind::Commit),
            entry(4, t2, EntryKind::Commit),
        ],
    );

    let storage = StorageManager::new();
    RecoveryManager::run(temp.path(), &storage).unwrap();

    assert_eq!(storage.get("k"), Some("second".to_string()));
}

// =============================================================================
// UNDO of Partially-Applied Work
// =============================================================================

#[test]
fn test_undo_reverses_applied_uncommitted_put() {
    // Simulate a storage image where the uncommitted put at LSN 2 was
    // already applied before the crash
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t, EntryKind::Begin),
            entry(2, t, put("k", Some("old"), "new")),
        ],
    );

    let storage = StorageManager::new();
    storage.put("k".to_string(), "new".to_string(), 2);

    RecoveryManager::run(temp.path(), &storage).unwrap();
    assert_eq!(storage.get("k"), Some("old".to_string()));
}

#[test]
fn test_undo_removes_applied_uncommitted_insert() {
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();
    write_segment(&temp, 1, &[entry(1, t, put("k", None, "new"))]);

    let storage = StorageManager::new();
    storage.put("k".to_string(), "new".to_string(), 1);

    RecoveryManager::run(temp.path(), &storage).unwrap();
    assert_eq!(storage.get("k"), None);
}

#[test]
fn test_undo_restores_applied_uncommitted_delete() {
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();
    write_segment(&temp, 1, &[entry(5, t, delete("k", "v"))]);

    let storage = StorageManager::new();
    storage.delete("k", 5);

    RecoveryManager::run(temp.path(), &storage).unwrap();
    assert_eq!(storage.get("k"), Some("v".to_string()));
}

#[test]
fn test_undo_chain_survives_interleaved_transactions() {
    // The incomplete transaction's writes on "k" have non-consecutive
    // LSNs because another transaction logged between them; the chain
    // must still walk back to the original pre-image
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();
    let other = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t, put("k", Some("original"), "mid")),
            entry(2, other, put("unrelated", None, "x")),
            entry(3, other, EntryKind::Commit),
            entry(4, t, put("k", Some("mid"), "last")),
        ],
    );

    let storage = StorageManager::new();
    storage.put("k".to_string(), "last".to_string(), 4);

    RecoveryManager::run(temp.path(), &storage).unwrap();
    assert_eq!(storage.get("k"), Some("original".to_string()));
    assert_eq!(storage.get("unrelated"), Some("x".to_string()));
}

#[test]
fn test_undo_walks_descending_within_transaction() {
    // Both writes of the incomplete transaction were applied; undoing in
    // descending order must land on the original pre-image
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t, put("k", Some("original"), "mid")),
            entry(2, t, put("k", Some("mid"), "last")),
        ],
    );

    let storage = StorageManager::new();
    storage.put("k".to_string(), "last".to_string(), 2);

    RecoveryManager::run(temp.path(), &storage).unwrap();
    assert_eq!(storage.get("k"), Some("original".to_string()));
}

// =============================================================================
// Idempotence
// =============================================================================

#[test]
fn test_recovery_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let t1 = TxnId::new();
    let t2 = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t1, put("a", None, "1")),
            entry(2, t1, EntryKind::Commit),
            entry(3, t2, put("b", None, "2")),
            // t2 incomplete
        ],
    );

    let storage = StorageManager::new();
    RecoveryManager::run(temp.path(), &storage).unwrap();
    let first = storage.snapshot();

    RecoveryManager::run(temp.path(), &storage).unwrap();
    assert_eq!(storage.snapshot(), first);
}

// =============================================================================
// Corrupted / Truncated Tails
// =============================================================================

#[test]
fn test_commit_entry_lost_to_tail_corruption() {
    // The commit entry is present but corrupted: the transaction must be
    // treated as never having happened
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();

    let good = [
        entry(1, t, EntryKind::Begin),
        entry(2, t, put("k", None, "v")),
    ];
    let mut bytes = Vec::new();
    for e in &good {
        bytes.extend_from_slice(&e.encode().unwrap());
    }
    let mut commit = entry(3, t, EntryKind::Commit).encode().unwrap();
    let last = commit.len() - 1;
    commit[last] ^= 0xFF;
    bytes.extend_from_slice(&commit);

    let path = temp.path().join("wal-0000000001.log");
    let mut file = File::create(path).unwrap();
    file.write_all(&bytes).unwrap();
    file.sync_all().unwrap();

    let storage = StorageManager::new();
    let report = RecoveryManager::run(temp.path(), &storage).unwrap();

    assert!(report.truncated_tail);
    assert_eq!(report.committed_txns, 0);
    assert!(storage.is_empty());
}

// =============================================================================
// Checkpoints
// =============================================================================

#[test]
fn test_checkpoint_entry_reported() {
    let temp = TempDir::new().unwrap();
    let t = TxnId::new();
    write_segment(
        &temp,
        1,
        &[
            entry(1, t, put("a", None, "1")),
            entry(2, t, EntryKind::Commit),
            entry(3, TxnId::new(), EntryKind::Checkpoint { through_lsn: 2 }),
        ],
    );

    let storage = StorageManager::new();
    let report = RecoveryManager::run(temp.path(), &storage).unwrap();

    assert_eq!(report.last_checkpoint, Some(2));
    assert_eq!(report.incomplete_txns, 0);
    assert_eq!(storage.get("a"), Some("1".to_string()));
}
