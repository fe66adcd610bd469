//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append log entries before any mutation reaches the storage manager
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for total ordering
//! - Segment rotation and multi-segment forward scans
//!
//! ## File Format
//! Each segment is a sequence of framed entries:
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Entry 1                                      │
//! │ ┌──────────┬─────────┬─────────────────────┐ │
//! │ │ Len (4)  │ CRC (4) │ Body (bincode)      │ │
//! │ └──────────┴─────────┴─────────────────────┘ │
//! ├──────────────────────────────────────────────┤
//! │ Entry 2                                      │
//! │ ┌──────────┬─────────┬─────────────────────┐ │
//! │ │ Len (4)  │ CRC (4) │ Body (bincode)      │ │
//! │ └──────────┴─────────┴─────────────────────┘ │
//! └──────────────────────────────────────────────┘
//! ```
//! `Len` (little-endian) counts CRC + body. The CRC covers the body only,
//! i.e. the encoded `(lsn, txn_id, kind, timestamp)` tuple, never itself.

mod entry;
mod reader;
mod writer;

pub use entry::{EntryKind, LogEntry, Lsn, TxnId, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use reader::{LogIterator, WalReader};
pub use writer::{CommitBarrier, WalWriter};

use std::path::{Path, PathBuf};

/// File name for a segment with the given number
pub(crate) fn segment_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("wal-{:010}.log", number))
}

/// Parse a segment number from a file path, if it names a WAL segment
pub(crate) fn parse_segment_number(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix("wal-")?.strip_suffix(".log")?;
    stem.parse().ok()
}

/// Segment numbers present in a directory, in creation (ascending) order
pub(crate) fn list_segment_numbers(dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut numbers = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            if let Some(number) = parse_segment_number(&path) {
                numbers.push(number);
            }
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}
