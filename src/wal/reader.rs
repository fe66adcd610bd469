//! WAL Reader
//!
//! Lazy, forward-ordered scans over all segments in creation order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::entry::{LogEntry, Lsn, MAX_FRAME_SIZE};
use super::{list_segment_numbers, segment_path};

/// Reads entries from a WAL directory.
///
/// Segments are visited in numeric (creation) order. Scans stop at the
/// first corrupted or truncated frame: on an append-only medium that can
/// only be the tail of a writer's last in-flight write, so everything
/// after it is by definition not durably committed.
pub struct WalReader {
    dir: PathBuf,
    segments: Vec<u64>,
}

impl WalReader {
    /// Open a reader over `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        let segments = list_segment_numbers(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            segments,
        })
    }

    /// Iterate over all valid entries
    pub fn entries(&self) -> LogIterator {
        self.entries_from(0)
    }

    /// Iterate over valid entries with `lsn >= start_lsn`.
    ///
    /// The iterator is restartable: calling this again yields a fresh,
    /// independent scan.
    pub fn entries_from(&self, start_lsn: Lsn) -> LogIterator {
        LogIterator {
            dir: self.dir.clone(),
            remaining: self.segments.clone().into_iter(),
            current: None,
            start_lsn,
            stopped: false,
            truncated: false,
            corrupted_frames: 0,
            entries_read: 0,
            last_lsn: 0,
            io_error: None,
        }
    }

    /// Number of segments on disk
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Lazy iterator over WAL entries across segment boundaries.
///
/// After iteration completes, the accessors report how the scan ended:
/// [`truncated`](Self::truncated) for a bad tail frame,
/// [`io_error`](Self::io_error) for a read failure that is not plain
/// end-of-file (the caller decides whether that is fatal).
pub struct LogIterator {
    dir: PathBuf,
    remaining: std::vec::IntoIter<u64>,
    current: Option<BufReader<File>>,
    start_lsn: Lsn,
    stopped: bool,
    truncated: bool,
    corrupted_frames: u64,
    entries_read: u64,
    last_lsn: Lsn,
    io_error: Option<String>,
}

impl LogIterator {
    /// Whether the scan stopped early at a corrupted or truncated frame
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Frames that failed checksum validation (0 or 1; the scan stops)
    pub fn corrupted_frames(&self) -> u64 {
        self.corrupted_frames
    }

    /// Valid entries decoded so far (including ones below `start_lsn`)
    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    /// Highest LSN among valid entries seen so far
    pub fn last_lsn(&self) -> Lsn {
        self.last_lsn
    }

    /// A read failure other than end-of-file, if one stopped the scan
    pub fn io_error(&self) -> Option<&str> {
        self.io_error.as_deref()
    }

    /// Read the next valid entry, ignoring the `start_lsn` filter
    fn next_valid(&mut self) -> Option<LogEntry> {
        loop {
            let reader = match self.current.as_mut() {
                Some(r) => r,
                None => {
                    let number = self.remaining.next()?;
                    let path = segment_path(&self.dir, number);
                    match File::open(&path) {
                        Ok(file) => {
                            self.current = Some(BufReader::new(file));
                            continue;
                        }
                        Err(e) => {
                            self.io_error = Some(format!("{}: {}", path.display(), e));
                            self.stopped = true;
                            return None;
                        }
                    }
                }
            };

            match read_frame(reader) {
                FrameRead::Entry(entry) => {
                    self.entries_read += 1;
                    self.last_lsn = self.last_lsn.max(entry.lsn);
                    return Some(entry);
                }
                FrameRead::Eof => {
                    // Clean segment boundary; move to the next one
                    self.current = None;
                }
                FrameRead::Truncated => {
                    self.truncated = true;
                    self.stopped = true;
                    return None;
                }
                FrameRead::Corrupted => {
                    self.truncated = true;
                    self.corrupted_frames += 1;
                    self.stopped = true;
                    return None;
                }
                FrameRead::Io(msg) => {
                    self.io_error = Some(msg);
                    self.stopped = true;
                    return None;
                }
            }
        }
    }
}

impl Iterator for LogIterator {
    type Item = LogEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }
        loop {
            let entry = self.next_valid()?;
            if entry.lsn >= self.start_lsn {
                return Some(entry);
            }
        }
    }
}

/// Outcome of reading one frame
enum FrameRead {
    Entry(LogEntry),
    Eof,
    Truncated,
    Corrupted,
    Io(String),
}

/// Read and validate a single frame from the current position
fn read_frame(reader: &mut BufReader<File>) -> FrameRead {
    // Length prefix: zero bytes means clean EOF, a short read means a
    // write was interrupted mid-frame.
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_buf) {
        Ok(ReadStatus::Full) => {}
        Ok(ReadStatus::Eof) => return FrameRead::Eof,
        Ok(ReadStatus::Partial) => return FrameRead::Truncated,
        Err(e) => return FrameRead::Io(e.to_string()),
    }

    let frame_len = u32::from_le_bytes(len_buf) as usize;
    if frame_len < 4 || frame_len > MAX_FRAME_SIZE {
        return FrameRead::Corrupted;
    }

    let mut frame = vec![0u8; frame_len];
    match read_exact_or_eof(reader, &mut frame) {
        Ok(ReadStatus::Full) => {}
        Ok(ReadStatus::Eof) | Ok(ReadStatus::Partial) => return FrameRead::Truncated,
        Err(e) => return FrameRead::Io(e.to_string()),
    }

    match LogEntry::decode_frame(&frame) {
        Ok(entry) => FrameRead::Entry(entry),
        Err(_) => FrameRead::Corrupted,
    }
}

enum ReadStatus {
    Full,
    Partial,
    Eof,
}

/// Like `read_exact`, but distinguishes clean EOF from a partial read
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<ReadStatus> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 {
                    ReadStatus::Eof
                } else {
                    ReadStatus::Partial
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(ReadStatus::Full)
}
