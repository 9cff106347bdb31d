//! Attempt Integrity Ledger
//!
//! The authoritative, append-only record of violation events for one test
//! attempt:
//! - Monotonic escalation (clean -> flagged -> terminated)
//! - Self-sealing on termination
//! - Store interface for handing sealed ledgers to persistence

pub mod ledger;
pub mod store;

pub use ledger::{AttemptIntegrityLedger, EscalationPolicy, IntegrityStatus};
pub use store::{InMemoryViolationStore, ViolationRecord, ViolationStore};

use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Appending after seal is a programming error in the orchestration,
    /// not an expected runtime condition.
    #[error("ledger for attempt {0} is sealed")]
    Sealed(uuid::Uuid),
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("attempt not found")]
    NotFound,
}
