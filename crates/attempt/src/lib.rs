//! Test Attempt Lifecycle
//!
//! Tracks one student's timed run through a test:
//! - Attempt identity and exam deadline
//! - Phase transitions (in progress, submitted, auto-submitted, terminated)
//! - The lifecycle collaborator interface the proctoring layer calls into

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Attempt error types
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: AttemptPhase,
        to: AttemptPhase,
    },

    #[error("attempt not found: {0}")]
    NotFound(Uuid),
}

/// Phase of a test attempt
///
/// Transitions only ever leave `InProgress`; the three closed phases are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    #[default]
    InProgress,
    Submitted,
    AutoSubmitted,
    Terminated,
}

impl AttemptPhase {
    /// Whether the attempt is still being taken
    pub fn is_open(&self) -> bool {
        matches!(self, AttemptPhase::InProgress)
    }
}

/// One student's timed run through a test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Allowed working time in seconds
    pub allowed_secs: u64,
    pub phase: AttemptPhase,
    /// Reason recorded when the attempt was terminated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_reason: Option<String>,
}

impl TestAttempt {
    /// Start a new attempt with the given time allowance
    pub fn start(user_id: Uuid, allowed_secs: u64) -> Self {
        let attempt = Self {
            id: Uuid::new_v4(),
            user_id,
            started_at: Utc::now(),
            allowed_secs,
            phase: AttemptPhase::InProgress,
            terminated_reason: None,
        };
        info!(attempt_id = %attempt.id, allowed_secs, "attempt started");
        attempt
    }

    /// Hard deadline for this attempt
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + Duration::seconds(self.allowed_secs as i64)
    }

    /// Working time left at `now`, zero once the deadline has passed
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline() - now).max(Duration::zero())
    }

    /// Whether the deadline has passed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }

    /// Student submitted their answers
    pub fn submit(&mut self) -> Result<(), AttemptError> {
        self.transition(AttemptPhase::Submitted)
    }

    /// Deadline expired; answers are submitted as-is
    pub fn auto_submit(&mut self) -> Result<(), AttemptError> {
        self.transition(AttemptPhase::AutoSubmitted)
    }

    /// Attempt terminated by the integrity policy
    ///
    /// Partial answers are kept: termination force-submits with a
    /// `terminated` flag so the record stays auditable.
    pub fn terminate(&mut self, reason: &str) -> Result<(), AttemptError> {
        self.transition(AttemptPhase::Terminated)?;
        self.terminated_reason = Some(reason.to_string());
        Ok(())
    }

    fn transition(&mut self, to: AttemptPhase) -> Result<(), AttemptError> {
        if !self.phase.is_open() {
            return Err(AttemptError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        info!(attempt_id = %self.id, from = ?self.phase, to = ?to, "attempt phase change");
        self.phase = to;
        Ok(())
    }
}

/// External attempt lifecycle collaborator
///
/// Implemented by the platform layer that owns answers and grading. The
/// proctoring controller only ever tells it how the attempt ended.
pub trait AttemptLifecycle: Send {
    fn submit(&mut self, attempt_id: Uuid) -> Result<(), AttemptError>;

    fn auto_submit(&mut self, attempt_id: Uuid) -> Result<(), AttemptError>;

    fn terminate(&mut self, attempt_id: Uuid, reason: &str) -> Result<(), AttemptError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt() -> TestAttempt {
        TestAttempt::start(Uuid::new_v4(), 1800)
    }

    #[test]
    fn test_deadline_math() {
        let a = attempt();
        let mid = a.started_at + Duration::seconds(600);
        assert_eq!(a.remaining(mid), Duration::seconds(1200));
        assert!(!a.is_expired(mid));

        let past = a.started_at + Duration::seconds(1801);
        assert!(a.is_expired(past));
        assert_eq!(a.remaining(past), Duration::zero());
    }

    #[test]
    fn test_submit_closes_attempt() {
        let mut a = attempt();
        a.submit().unwrap();
        assert_eq!(a.phase, AttemptPhase::Submitted);
        assert!(!a.phase.is_open());
    }

    #[test]
    fn test_terminate_records_reason() {
        let mut a = attempt();
        a.terminate("integrity limit reached").unwrap();
        assert_eq!(a.phase, AttemptPhase::Terminated);
        assert_eq!(
            a.terminated_reason.as_deref(),
            Some("integrity limit reached")
        );
    }

    #[test]
    fn test_closed_attempt_rejects_transitions() {
        let mut a = attempt();
        a.auto_submit().unwrap();

        let err = a.submit().unwrap_err();
        assert!(matches!(
            err,
            AttemptError::InvalidTransition {
                from: AttemptPhase::AutoSubmitted,
                to: AttemptPhase::Submitted,
            }
        ));
        // Phase unchanged after the rejected transition
        assert_eq!(a.phase, AttemptPhase::AutoSubmitted);
    }
}
