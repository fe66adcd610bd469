//! In-memory transaction state

use std::collections::HashMap;

use crate::wal::{EntryKind, LogEntry, TxnId};

/// Lifecycle of a transaction. The transition out of `Active` is one-way
/// and happens exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
}

/// An in-flight transaction.
///
/// Owns the ordered list of entries it has produced (the UNDO images ride
/// along inside them) and an overlay of its own writes for
/// read-your-writes lookups. Ownership ends at finalization; from then on
/// the log is the transaction's history.
#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    status: TxnStatus,
    ops: Vec<LogEntry>,
    /// key -> pending value; `None` marks a pending delete
    overlay: HashMap<String, Option<String>>,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            status: TxnStatus::Active,
            ops: Vec::new(),
            overlay: HashMap::new(),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn status(&self) -> TxnStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TxnStatus::Active
    }

    /// Buffered operations in program order
    pub fn ops(&self) -> &[LogEntry] {
        &self.ops
    }

    /// Record a logged operation and fold it into the overlay
    pub fn record_op(&mut self, entry: LogEntry) {
        match &entry.kind {
            EntryKind::Put { key, new_value, .. } => {
                self.overlay.insert(key.clone(), Some(new_value.clone()));
            }
            EntryKind::Delete { key, .. } => {
                self.overlay.insert(key.clone(), None);
            }
            _ => {}
        }
        self.ops.push(entry);
    }

    /// This transaction's own view of a key.
    ///
    /// `None`: the transaction has not touched the key. `Some(None)`: the
    /// transaction deleted it. `Some(Some(v))`: the transaction wrote v.
    pub fn overlay_get(&self, key: &str) -> Option<Option<&str>> {
        self.overlay.get(key).map(|v| v.as_deref())
    }

    pub fn mark_committed(&mut self) {
        debug_assert!(self.is_active());
        self.status = TxnStatus::Committed;
    }

    pub fn mark_aborted(&mut self) {
        debug_assert!(self.is_active());
        self.status = TxnStatus::Aborted;
    }
}
