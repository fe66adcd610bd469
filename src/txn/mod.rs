//! Transaction Module
//!
//! Client-visible transactions: begin, put/delete, commit, rollback.
//!
//! ## Responsibilities
//! - One-way `Active -> {Committed | Aborted}` state machine per transaction
//! - WAL-first: every operation is logged before it can take effect
//! - Commit durability barrier per the configured sync mode
//! - Read-your-writes: a transaction sees its own uncommitted writes
//!   layered over committed state, never another transaction's

mod manager;
mod transaction;

pub use manager::TransactionManager;
pub use transaction::{Transaction, TxnStatus};
