//! Storage Module
//!
//! Holds the "current" key/value state as a materialized cache of
//! committed log content.
//!
//! ## Responsibilities
//! - O(1) amortized reads of committed state
//! - Idempotent application of committed entries (REDO safety)
//! - LSN bookkeeping per record, so recovery can tell already-applied
//!   from not-yet-applied entries
//!
//! The storage manager has no durability obligations of its own; it can
//! always be rebuilt entirely from the log.

mod store;

pub use store::{Record, StorageManager};
