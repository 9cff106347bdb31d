//! Ledger and escalation policy

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use violation_engine::{ViolationEvent, ViolationKind};

use crate::LedgerError;

/// Integrity status of an attempt
///
/// Only ever moves forward: clean -> flagged -> terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    #[default]
    Clean,
    Flagged,
    Terminated,
}

/// Escalation policy
///
/// Audit kinds (`device_unavailable`) are recorded but never counted
/// toward escalation: a camera failure must not flag the candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Cumulative count per kind at which the attempt is flagged
    pub soft_limit_per_kind: u32,

    /// Total violation count at which the attempt is terminated
    pub hard_total_limit: u32,

    /// Kinds that terminate on first occurrence
    pub critical_kinds: Vec<ViolationKind>,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            soft_limit_per_kind: 1,
            hard_total_limit: 5,
            critical_kinds: vec![ViolationKind::DevtoolsOpen],
        }
    }
}

impl EscalationPolicy {
    /// Zero-tolerance preset
    pub fn strict() -> Self {
        Self {
            soft_limit_per_kind: 1,
            hard_total_limit: 3,
            critical_kinds: vec![ViolationKind::DevtoolsOpen, ViolationKind::CopyAttempt],
        }
    }

    /// Lenient preset
    pub fn lenient() -> Self {
        Self {
            soft_limit_per_kind: 3,
            hard_total_limit: 10,
            critical_kinds: vec![ViolationKind::DevtoolsOpen],
        }
    }

    fn counts_toward_escalation(kind: ViolationKind) -> bool {
        kind != ViolationKind::DeviceUnavailable
    }
}

/// Append-only integrity record for one test attempt
///
/// Counts-by-kind always equal the number of appended events of that kind;
/// both are updated by the single append operation and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptIntegrityLedger {
    attempt_id: Uuid,
    user_id: Uuid,
    events: Vec<ViolationEvent>,
    counts_by_kind: BTreeMap<ViolationKind, u32>,
    status: IntegrityStatus,
    sealed: bool,
    policy: EscalationPolicy,
}

impl AttemptIntegrityLedger {
    pub fn new(attempt_id: Uuid, user_id: Uuid, policy: EscalationPolicy) -> Self {
        Self {
            attempt_id,
            user_id,
            events: Vec::new(),
            counts_by_kind: BTreeMap::new(),
            status: IntegrityStatus::Clean,
            sealed: false,
            policy,
        }
    }

    /// Append one violation event and recompute status
    ///
    /// Returns the status after the append. Reaching `Terminated` seals the
    /// ledger; the caller must then end the attempt.
    pub fn append(&mut self, event: ViolationEvent) -> Result<IntegrityStatus, LedgerError> {
        if self.sealed {
            return Err(LedgerError::Sealed(self.attempt_id));
        }

        let kind = event.kind;
        *self.counts_by_kind.entry(kind).or_insert(0) += 1;
        self.events.push(event);
        self.escalate(kind);

        Ok(self.status)
    }

    fn escalate(&mut self, appended: ViolationKind) {
        if !EscalationPolicy::counts_toward_escalation(appended) {
            return;
        }

        let total: u32 = self
            .counts_by_kind
            .iter()
            .filter(|(k, _)| EscalationPolicy::counts_toward_escalation(**k))
            .map(|(_, n)| n)
            .sum();

        let terminated = total >= self.policy.hard_total_limit
            || self.policy.critical_kinds.contains(&appended);
        if terminated {
            if self.status != IntegrityStatus::Terminated {
                warn!(
                    attempt_id = %self.attempt_id,
                    kind = appended.as_str(),
                    total,
                    "integrity limit reached, attempt terminated"
                );
            }
            self.status = IntegrityStatus::Terminated;
            self.sealed = true;
            return;
        }

        let over_soft = self.counts_by_kind[&appended] >= self.policy.soft_limit_per_kind;
        if over_soft && self.status == IntegrityStatus::Clean {
            info!(attempt_id = %self.attempt_id, kind = appended.as_str(), "attempt flagged");
            self.status = IntegrityStatus::Flagged;
        }
    }

    /// Seal the ledger, making it read-only
    ///
    /// Idempotent. Called on attempt end; termination seals implicitly.
    pub fn seal(&mut self) {
        if !self.sealed {
            info!(attempt_id = %self.attempt_id, status = ?self.status, "ledger sealed");
            self.sealed = true;
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn status(&self) -> IntegrityStatus {
        self.status
    }

    /// Events in append (time) order
    pub fn events(&self) -> &[ViolationEvent] {
        &self.events
    }

    pub fn count_of(&self, kind: ViolationKind) -> u32 {
        self.counts_by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn counts_by_kind(&self) -> &BTreeMap<ViolationKind, u32> {
        &self.counts_by_kind
    }

    /// Total events, audit annotations included
    pub fn total_events(&self) -> usize {
        self.events.len()
    }
}
