//! Violation store

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use violation_engine::{ViolationDetail, ViolationKind};

use crate::{AttemptIntegrityLedger, IntegrityStatus, StoreError};

/// One persisted violation row, keyed by (attempt_id, occurred_at)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub attempt_id: Uuid,
    pub user_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub violation_type: String,
    pub violation_details: ViolationDetail,
}

/// Final integrity summary persisted alongside the rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub attempt_id: Uuid,
    pub status: IntegrityStatus,
    pub terminated: bool,
}

/// Persistence collaborator for sealed ledgers
///
/// The real backend is a remote relational store; the pipeline only
/// depends on this interface.
pub trait ViolationStore: Send {
    /// Write a sealed ledger's rows plus the terminate instruction
    fn persist(
        &self,
        ledger: &AttemptIntegrityLedger,
        terminate_attempt: bool,
    ) -> Result<(), StoreError>;
}

impl<S: ViolationStore + Send + Sync> ViolationStore for std::sync::Arc<S> {
    fn persist(
        &self,
        ledger: &AttemptIntegrityLedger,
        terminate_attempt: bool,
    ) -> Result<(), StoreError> {
        (**self).persist(ledger, terminate_attempt)
    }
}

/// In-memory violation store
pub struct InMemoryViolationStore {
    rows: Mutex<Vec<ViolationRecord>>,
    summaries: Mutex<HashMap<Uuid, AttemptSummary>>,
    /// Retention cap on stored rows
    max_rows: usize,
}

impl InMemoryViolationStore {
    pub fn new() -> Self {
        info!("creating in-memory violation store");
        Self {
            rows: Mutex::new(Vec::with_capacity(1024)),
            summaries: Mutex::new(HashMap::new()),
            max_rows: 100_000,
        }
    }

    /// Rows for one attempt, newest first, optionally filtered by kind
    pub fn rows_for_attempt(
        &self,
        attempt_id: Uuid,
        kind: Option<ViolationKind>,
        limit: usize,
    ) -> Result<Vec<ViolationRecord>, StoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;

        Ok(rows
            .iter()
            .rev()
            .filter(|r| r.attempt_id == attempt_id)
            .filter(|r| kind.map_or(true, |k| r.violation_type == k.as_str()))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Final summary for one attempt, if it has been persisted
    pub fn attempt_summary(&self, attempt_id: Uuid) -> Result<AttemptSummary, StoreError> {
        let summaries = self
            .summaries
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        summaries.get(&attempt_id).cloned().ok_or(StoreError::NotFound)
    }

    /// Total stored rows
    pub fn row_count(&self) -> usize {
        self.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Total persisted attempts
    pub fn attempt_count(&self) -> usize {
        self.summaries.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for InMemoryViolationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationStore for InMemoryViolationStore {
    fn persist(
        &self,
        ledger: &AttemptIntegrityLedger,
        terminate_attempt: bool,
    ) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;

        for event in ledger.events() {
            // Enforce retention
            while rows.len() >= self.max_rows {
                rows.remove(0);
            }
            rows.push(ViolationRecord {
                attempt_id: event.attempt_id,
                user_id: ledger.user_id(),
                occurred_at: event.occurred_at,
                violation_type: event.kind.as_str().to_string(),
                violation_details: event.detail.clone(),
            });
        }
        drop(rows);

        let mut summaries = self
            .summaries
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))?;
        summaries.insert(
            ledger.attempt_id(),
            AttemptSummary {
                attempt_id: ledger.attempt_id(),
                status: ledger.status(),
                terminated: terminate_attempt,
            },
        );

        debug!(
            attempt_id = %ledger.attempt_id(),
            events = ledger.total_events(),
            terminate_attempt,
            "ledger persisted"
        );
        Ok(())
    }
}
