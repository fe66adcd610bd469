//! StorageManager implementation
//!
//! RwLock'd map of key -> Record. Commits and recovery take the write
//! path; `get` takes the read path.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::wal::Lsn;

/// A record in the current materialized state.
///
/// Deletes leave a tombstone instead of removing the key outright, so the
/// last-modifying LSN of a delete stays observable. Recovery's UNDO pass
/// relies on that to tell whether a specific logged write was ever
/// applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A live value
    Value { value: String, lsn: Lsn },

    /// A deleted key (tombstone)
    Tombstone { lsn: Lsn },
}

impl Record {
    /// LSN of the last entry that modified this record
    pub fn lsn(&self) -> Lsn {
        match self {
            Record::Value { lsn, .. } => *lsn,
            Record::Tombstone { lsn } => *lsn,
        }
    }
}

/// The current key/value state, mutated only by committed log entries
/// (at commit time or during recovery replay).
pub struct StorageManager {
    records: RwLock<HashMap<String, Record>>,
}

impl StorageManager {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Get the live value for a key. Pure read, no side effects.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.records.read().get(key) {
            Some(Record::Value { value, .. }) => Some(value.clone()),
            Some(Record::Tombstone { .. }) | None => None,
        }
    }

    /// The full record for a key, tombstones included
    pub fn record(&self, key: &str) -> Option<Record> {
        self.records.read().get(key).cloned()
    }

    /// Upsert a value, recording `lsn` as the last-modifying LSN
    pub fn put(&self, key: String, value: String, lsn: Lsn) {
        self.records.write().insert(key, Record::Value { value, lsn });
    }

    /// Delete a key, leaving a tombstone.
    ///
    /// Deleting a nonexistent key is not an error at this layer; REDO may
    /// replay deletes against state that never saw the insert.
    pub fn delete(&self, key: &str, lsn: Lsn) {
        self.records
            .write()
            .insert(key.to_string(), Record::Tombstone { lsn });
    }

    /// Reverse the write at `lsn` if, and only if, it was actually
    /// applied (the record's current LSN matches). Returns whether
    /// anything was reverted.
    ///
    /// `old_value: Some(v)` restores v; `None` means the write was an
    /// insert and the key is removed. A mismatched or missing record is
    /// left alone, so UNDO can never clobber a later committed write and
    /// is idempotent under re-runs. Once a key's tail write has been
    /// reverted this way, earlier writes on the same key are reversed
    /// with [`restore`](Self::restore); the caller walking the chain
    /// knows more about lineage than any stamp here could encode.
    pub fn revert(&self, key: &str, lsn: Lsn, old_value: Option<&str>) -> bool {
        let mut records = self.records.write();
        match records.get(key) {
            Some(record) if record.lsn() == lsn => {
                Self::restore_locked(&mut *records, key, old_value, lsn.saturating_sub(1));
                true
            }
            _ => false,
        }
    }

    /// Unconditionally restore a pre-image, stamped `lsn`.
    ///
    /// `None` removes the key (the reversed write was an insert). Used
    /// by recovery to continue a revert chain on a key whose tail write
    /// has already been reversed.
    pub fn restore(&self, key: &str, old_value: Option<&str>, lsn: Lsn) {
        let mut records = self.records.write();
        Self::restore_locked(&mut *records, key, old_value, lsn);
    }

    fn restore_locked(
        records: &mut HashMap<String, Record>,
        key: &str,
        old_value: Option<&str>,
        lsn: Lsn,
    ) {
        match old_value {
            Some(value) => {
                records.insert(
                    key.to_string(),
                    Record::Value {
                        value: value.to_string(),
                        lsn,
                    },
                );
            }
            None => {
                records.remove(key);
            }
        }
    }

    /// Number of live (non-tombstone) keys
    pub fn len(&self) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| matches!(r, Record::Value { .. }))
            .count()
    }

    /// Whether there are no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live keys and values, for tests and tooling
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.records
            .read()
            .iter()
            .filter_map(|(k, r)| match r {
                Record::Value { value, .. } => Some((k.clone(), value.clone())),
                Record::Tombstone { .. } => None,
            })
            .collect()
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new()
    }
}
