//! Configuration for LedgerKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a LedgerKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Log Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for WAL segment files.
    /// Internal structure:
    ///   {log_directory}/
    ///     ├── wal-0000000001.log
    ///     ├── wal-0000000002.log
    ///     └── ...
    pub log_directory: PathBuf,

    /// Max size of the active segment before rotation (in bytes)
    pub max_segment_size: u64,

    /// Capacity of the writer's in-memory buffer (in bytes)
    pub buffer_size: usize,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Sync policy: when commits are made durable
    pub sync_mode: SyncMode,
}

/// Durability/latency trade-off for commit acknowledgment
///
/// | Mode | fsync | Data loss window |
/// |------|-------|------------------|
/// | Sync | every commit | zero |
/// | Async | on a timer | up to `interval_ms` |
/// | Batch | per group | up to one batch |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// fsync before every commit acknowledgment (safest, slowest)
    Sync,

    /// fsync on a background timer; commits do not wait.
    /// Entries appended since the last tick are lost on crash.
    Async {
        /// Milliseconds between background fsyncs
        interval_ms: u64,
    },

    /// Group commit: committers wait until the batch fills or the
    /// deadline passes, then share a single fsync.
    Batch {
        /// Commits per shared fsync
        max_entries: usize,
        /// Max milliseconds a committer waits for the batch to fill
        max_wait_ms: u64,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("./ledgerkv_data"),
            max_segment_size: 64 * 1024 * 1024, // 64 MB
            buffer_size: 8 * 1024,              // 8 KB
            sync_mode: SyncMode::Sync,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log directory (root for all WAL segments)
    pub fn log_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_directory = path.into();
        self
    }

    /// Set the max segment size before rotation (in bytes)
    pub fn max_segment_size(mut self, bytes: u64) -> Self {
        self.config.max_segment_size = bytes;
        self
    }

    /// Set the writer buffer capacity (in bytes)
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.config.buffer_size = bytes;
        self
    }

    /// Set the sync mode
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.config.sync_mode = mode;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
