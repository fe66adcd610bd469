//! WAL Writer
//!
//! Owns the active segment file, LSN issuance, buffering, rotation, and
//! the group-commit barrier used by `SyncMode::Batch`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::config::Config;
use crate::error::{LedgerError, Result};

use super::entry::{EntryKind, LogEntry, Lsn, TxnId};
use super::{list_segment_numbers, segment_path};

/// Appends entries to the WAL.
///
/// The writer is the single serialization point of the engine: LSNs are
/// allocated while the caller holds the writer lock, so LSN order is
/// physical file order by construction. A fresh segment is always opened
/// on startup; old segments are never appended to (their tails may have
/// been truncated by a crash).
pub struct WalWriter {
    /// Directory holding all segments
    dir: PathBuf,

    /// Buffered handle to the active segment
    active: BufWriter<File>,

    /// Number of the active segment (monotonic, never reused)
    segment_number: u64,

    /// Bytes written to the active segment so far
    segment_bytes: u64,

    /// Next LSN to hand out
    next_lsn: Lsn,

    /// Rotation threshold (bytes)
    max_segment_size: u64,

    /// Buffer capacity for newly opened segments
    buffer_size: usize,

    /// Whether bytes have been written since the last sync
    has_unsynced: bool,

    /// Set after a write or flush failure. A torn partial frame may be
    /// on disk at that point; anything appended behind it would be
    /// unreachable to recovery, which stops at the first bad frame. A
    /// poisoned writer refuses all further work until the process
    /// reopens the log (reopen always starts a fresh segment).
    poisoned: bool,
}

impl WalWriter {
    /// Open a writer over `dir`, continuing segment numbering after the
    /// highest existing segment and LSN numbering from `first_lsn`.
    pub fn open(dir: &Path, config: &Config, first_lsn: Lsn) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let segment_number = list_segment_numbers(dir)?
            .last()
            .map(|n| n + 1)
            .unwrap_or(1);

        let active = Self::create_segment(dir, segment_number, config.buffer_size)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            active,
            segment_number,
            segment_bytes: 0,
            next_lsn: first_lsn,
            max_segment_size: config.max_segment_size,
            buffer_size: config.buffer_size,
            has_unsynced: false,
            poisoned: false,
        })
    }

    /// Append an entry for `txn_id`, allocating its LSN.
    ///
    /// Returns the appended entry, LSN assigned. An `Io` error here is
    /// fatal to the in-flight transaction and poisons the writer: a
    /// partially written frame may be on the file, and any entry
    /// appended after that tear would be invisible to recovery.
    pub fn append(&mut self, txn_id: TxnId, kind: EntryKind) -> Result<LogEntry> {
        self.check_writable()?;
        let entry = LogEntry::new(self.next_lsn, txn_id, kind);
        let frame = entry.encode()?;

        // Rotate before the write so a frame never straddles segments
        if self.segment_bytes > 0
            && self.segment_bytes + frame.len() as u64 > self.max_segment_size
        {
            if let Err(e) = self.rotate() {
                self.poisoned = true;
                return Err(e);
            }
        }

        if let Err(e) = self.active.write_all(&frame) {
            self.poisoned = true;
            return Err(e.into());
        }
        self.segment_bytes += frame.len() as u64;
        self.has_unsynced = true;
        self.next_lsn += 1;
        Ok(entry)
    }

    /// Force all buffered bytes to durable storage.
    ///
    /// Blocks until the device acknowledges. Errors propagate, never
    /// swallowed, and poison the writer: a failed flush can leave a
    /// torn frame just like a failed append.
    pub fn sync(&mut self) -> Result<()> {
        self.check_writable()?;
        if let Err(e) = self.flush_and_sync() {
            self.poisoned = true;
            return Err(e);
        }
        Ok(())
    }

    fn flush_and_sync(&mut self) -> Result<()> {
        self.active.flush()?;
        if self.has_unsynced {
            self.active.get_ref().sync_all()?;
            self.has_unsynced = false;
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.poisoned {
            return Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "WAL writer disabled after an earlier write failure",
            )));
        }
        Ok(())
    }

    /// Whether an earlier write failure has disabled this writer
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// The next LSN that will be assigned
    pub fn current_lsn(&self) -> Lsn {
        self.next_lsn
    }

    /// Number of the active segment
    pub fn segment_number(&self) -> u64 {
        self.segment_number
    }

    /// Whether appended bytes are still awaiting a sync
    pub fn has_unsynced(&self) -> bool {
        self.has_unsynced
    }

    /// Close the active segment and open the next one.
    ///
    /// The outgoing segment is flushed and synced first; rotation never
    /// leaves acknowledged bytes behind in a closed segment's buffer.
    fn rotate(&mut self) -> Result<()> {
        self.active.flush()?;
        self.active.get_ref().sync_all()?;
        self.has_unsynced = false;

        let next = self.segment_number + 1;
        self.active = Self::create_segment(&self.dir, next, self.buffer_size)?;

        debug!(
            closed = self.segment_number,
            opened = next,
            bytes = self.segment_bytes,
            "rotated WAL segment"
        );
        self.segment_number = next;
        self.segment_bytes = 0;
        Ok(())
    }

    fn create_segment(dir: &Path, number: u64, buffer_size: usize) -> Result<BufWriter<File>> {
        let path = segment_path(dir, number);
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        Ok(BufWriter::with_capacity(buffer_size, file))
    }
}

/// Group-commit barrier for `SyncMode::Batch`.
///
/// Committing threads park here after appending their `Commit` entry.
/// Whichever of (batch full, deadline passed) happens first, one thread
/// performs the shared sync and every waiter in the batch is released
/// with its outcome.
pub struct CommitBarrier {
    max_entries: usize,
    max_wait: Duration,
    state: Mutex<BatchState>,
    batch_done: Condvar,
}

struct BatchState {
    /// Incremented once per completed sync; waiters from earlier
    /// generations are covered by any later sync.
    generation: u64,
    /// Commits accumulated in the current batch
    pending: usize,
    /// Outcome of the most recent sync, shared with released waiters
    last_error: Option<String>,
}

impl CommitBarrier {
    pub fn new(max_entries: usize, max_wait_ms: u64) -> Self {
        Self {
            max_entries: max_entries.max(1),
            max_wait: Duration::from_millis(max_wait_ms),
            state: Mutex::new(BatchState {
                generation: 0,
                pending: 0,
                last_error: None,
            }),
            batch_done: Condvar::new(),
        }
    }

    /// Join the current batch and block until its sync has completed.
    pub fn wait(&self, wal: &Mutex<WalWriter>) -> Result<()> {
        let mut state = self.state.lock();
        let joined = state.generation;
        state.pending += 1;

        if state.pending >= self.max_entries {
            return self.flush_batch(state, wal);
        }

        let deadline = Instant::now() + self.max_wait;
        loop {
            if state.generation > joined {
                // Another thread synced after we appended; we are covered.
                return Self::shared_outcome(&state);
            }
            if self
                .batch_done
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if state.generation > joined {
                    return Self::shared_outcome(&state);
                }
                // Deadline hit with the batch still open: we flush it.
                return self.flush_batch(state, wal);
            }
        }
    }

    fn flush_batch(
        &self,
        mut state: parking_lot::MutexGuard<'_, BatchState>,
        wal: &Mutex<WalWriter>,
    ) -> Result<()> {
        let outcome = wal.lock().sync();
        state.generation += 1;
        state.pending = 0;
        state.last_error = outcome.as_ref().err().map(|e| e.to_string());
        self.batch_done.notify_all();
        outcome
    }

    fn shared_outcome(state: &BatchState) -> Result<()> {
        match &state.last_error {
            None => Ok(()),
            Some(msg) => Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                msg.clone(),
            ))),
        }
    }
}
