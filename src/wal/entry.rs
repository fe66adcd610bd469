//! WAL Entry definitions
//!
//! Defines the structure of individual log entries and their
//! length-prefixed, checksummed on-disk framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, Result};

/// Log Sequence Number: monotonically increasing, assigned once per entry
/// at append time, never reused.
pub type Lsn = u64;

/// Frame header: 4-byte length prefix + 4-byte CRC32
pub const FRAME_HEADER_SIZE: usize = 8;

/// Upper bound on a single frame; anything larger is treated as corruption
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Opaque transaction identifier (UUID v4, collision-resistant)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Mint a fresh id
    pub fn new() -> Self {
        TxnId(Uuid::new_v4())
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TxnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: Lsn,

    /// Transaction this entry belongs to
    pub txn_id: TxnId,

    /// What happened
    pub kind: EntryKind,

    /// Timestamp (unix millis) when the entry was created.
    /// Informational only; ordering is by LSN.
    pub timestamp_ms: u64,
}

/// Logged facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Transaction started
    Begin,

    /// Key written. `old_value` is the pre-image for UNDO
    /// (`None` when the put is an insert).
    Put {
        key: String,
        old_value: Option<String>,
        new_value: String,
    },

    /// Key removed. `old_value` is the pre-image for UNDO.
    Delete { key: String, old_value: String },

    /// Transaction committed (terminal)
    Commit,

    /// Transaction rolled back (terminal)
    Rollback,

    /// Every entry at or below `through_lsn` has been applied to the
    /// storage manager. Bounds recovery scan latency only.
    Checkpoint { through_lsn: Lsn },
}

impl EntryKind {
    /// Whether this entry carries a data mutation (REDO/UNDO relevant)
    pub fn is_mutation(&self) -> bool {
        matches!(self, EntryKind::Put { .. } | EntryKind::Delete { .. })
    }
}

impl LogEntry {
    /// Create an entry timestamped now
    pub fn new(lsn: Lsn, txn_id: TxnId, kind: EntryKind) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            txn_id,
            kind,
            timestamp_ms,
        }
    }

    /// Encode to a complete on-disk frame: `[len (4, LE)][crc (4, LE)][body]`
    ///
    /// `len` counts CRC + body. The CRC32 covers the body only.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let crc = crc32fast::hash(&body);
        let frame_len = (4 + body.len()) as u32;

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
        frame.extend_from_slice(&frame_len.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode a complete frame produced by [`encode`](Self::encode).
    ///
    /// Fails closed: any length mismatch or checksum failure returns
    /// `Corruption`, never a partially-trusted entry.
    pub fn decode(bytes: &[u8]) -> Result<LogEntry> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(LedgerError::Corruption(format!(
                "truncated frame header: {} bytes",
                bytes.len()
            )));
        }

        let frame_len =
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if frame_len < 4 || frame_len > MAX_FRAME_SIZE {
            return Err(LedgerError::Corruption(format!(
                "implausible frame length: {}",
                frame_len
            )));
        }
        if bytes.len() < 4 + frame_len {
            return Err(LedgerError::Corruption(format!(
                "truncated frame: expected {} bytes, got {}",
                4 + frame_len,
                bytes.len()
            )));
        }

        Self::decode_frame(&bytes[4..4 + frame_len])
    }

    /// Decode the post-length portion of a frame: `[crc (4, LE)][body]`
    pub(crate) fn decode_frame(frame: &[u8]) -> Result<LogEntry> {
        if frame.len() < 4 {
            return Err(LedgerError::Corruption(format!(
                "frame too short for checksum: {} bytes",
                frame.len()
            )));
        }

        let stored_crc = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let body = &frame[4..];

        let actual_crc = crc32fast::hash(body);
        if actual_crc != stored_crc {
            return Err(LedgerError::Corruption(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored_crc, actual_crc
            )));
        }

        bincode::deserialize(body)
            .map_err(|e| LedgerError::Corruption(format!("undecodable entry body: {}", e)))
    }
}
