//! Session state machine

use attempt::{AttemptLifecycle, TestAttempt};
use integrity_ledger::{AttemptIntegrityLedger, IntegrityStatus, ViolationStore};
use tracing::{debug, error, info, warn};
use violation_engine::{
    BrowserSignal, DetailValue, FaceCount, TickObservation, ViolationDebouncer, ViolationDetail,
    ViolationEvent, ViolationKind,
};
use vision::GazeDirection;

use crate::status::{AiStatus, CameraPermission, StatusFeed};
use crate::SessionConfig;

/// Proctoring session phase
///
/// `Ended { degraded: true }` means the vision pipeline never came up;
/// the attempt itself continues under event-only monitoring until the
/// lifecycle closes it. `Ended` is absorbing either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Acquiring,
    Active,
    Suspended,
    Ended { degraded: bool },
}

/// Why the session is ending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Student submitted their answers
    Submitted,
    /// Exam deadline expired
    AutoSubmitted,
    /// Integrity policy terminated the attempt
    Terminated,
    /// Host navigated away or cancelled
    Cancelled,
}

/// What the caller must do after feeding the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Continue,
    EndAttempt(EndReason),
}

/// Synchronous state machine at the heart of the session
///
/// Owns the debouncer and the ledger; the async controller owns the
/// device and classifier and feeds observations in. All mutation happens
/// on one logical thread.
pub struct SessionEngine<L: AttemptLifecycle, S: ViolationStore> {
    attempt: TestAttempt,
    phase: SessionPhase,
    debouncer: ViolationDebouncer,
    ledger: AttemptIntegrityLedger,
    lifecycle: L,
    store: S,
    status: StatusFeed,
    finalized: bool,
}

impl<L: AttemptLifecycle, S: ViolationStore> SessionEngine<L, S> {
    pub fn new(
        attempt: TestAttempt,
        config: &SessionConfig,
        lifecycle: L,
        store: S,
        status: StatusFeed,
    ) -> Self {
        let debouncer = ViolationDebouncer::new(attempt.id, &config.debounce);
        let ledger =
            AttemptIntegrityLedger::new(attempt.id, attempt.user_id, config.escalation.clone());
        Self {
            attempt,
            phase: SessionPhase::Uninitialized,
            debouncer,
            ledger,
            lifecycle,
            store,
            status,
            finalized: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn attempt(&self) -> &TestAttempt {
        &self.attempt
    }

    pub fn ledger(&self) -> &AttemptIntegrityLedger {
        &self.ledger
    }

    pub fn debouncer(&self) -> &ViolationDebouncer {
        &self.debouncer
    }

    /// Whether the sampling loop should be consuming frames
    pub fn is_sampling(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Session start: begin device + model acquisition
    pub fn begin_acquiring(&mut self) {
        debug_assert_eq!(self.phase, SessionPhase::Uninitialized);
        self.phase = SessionPhase::Acquiring;
        self.status.set_ai(AiStatus::Initializing);
        info!(attempt_id = %self.attempt.id, "proctoring session acquiring");
    }

    /// Device and model both came up; sampling begins
    pub fn activate(&mut self) {
        debug_assert_eq!(self.phase, SessionPhase::Acquiring);
        self.phase = SessionPhase::Active;
        self.status.set_camera(CameraPermission::Granted);
        self.status.set_ai(AiStatus::Detecting);
        info!(attempt_id = %self.attempt.id, "vision monitoring active");
    }

    /// Acquisition failed: fall back to event-only monitoring
    ///
    /// The attempt keeps running; the failure is recorded in the ledger
    /// for audit and surfaced once through the camera permission status.
    pub fn degrade(&mut self, reason: &str, camera: CameraPermission) {
        debug_assert_eq!(self.phase, SessionPhase::Acquiring);
        self.phase = SessionPhase::Ended { degraded: true };
        self.status.set_camera(camera);
        warn!(
            attempt_id = %self.attempt.id,
            reason,
            "vision monitoring unavailable, continuing with event-only monitoring"
        );

        let mut detail = ViolationDetail::new();
        detail.insert("reason".into(), reason.into());
        detail.insert("degraded".into(), DetailValue::Flag(true));
        let event = ViolationEvent::now(self.attempt.id, ViolationKind::DeviceUnavailable, detail);
        if let Err(e) = self.ledger.append(event) {
            error!(error = %e, "failed to record device_unavailable annotation");
        }
    }

    /// Pause frame consumption without touching any counter
    pub fn suspend(&mut self) {
        if self.phase == SessionPhase::Active {
            self.phase = SessionPhase::Suspended;
            debug!(attempt_id = %self.attempt.id, "sampling suspended");
        }
    }

    /// Resume frame consumption
    pub fn resume(&mut self) {
        if self.phase == SessionPhase::Suspended {
            self.phase = SessionPhase::Active;
            debug!(attempt_id = %self.attempt.id, "sampling resumed");
        }
    }

    /// Feed one valid vision tick
    ///
    /// Skipped ticks (inference errors, dropped frames) must not reach
    /// this method; the caller drops them before classification.
    pub fn observe_tick(&mut self, obs: &TickObservation) -> Directive {
        if self.phase != SessionPhase::Active {
            debug!(phase = ?self.phase, "tick ignored outside active phase");
            return Directive::Continue;
        }

        self.status.set_ai(Self::ai_status_for(obs));
        let events = self.debouncer.observe_tick(obs);
        self.append_all(events)
    }

    /// Feed one discrete browser signal
    ///
    /// Accepted while the attempt is open, including degraded mode where
    /// event-only monitoring is all that remains.
    pub fn browser_signal(&mut self, signal: BrowserSignal) -> Directive {
        if self.finalized || self.ledger.is_sealed() {
            debug!(?signal, "signal ignored, ledger closed");
            return Directive::Continue;
        }

        let event = self.debouncer.observe_signal(signal);
        self.append_all(event.into_iter().collect())
    }

    /// End the session: seal, persist, notify the lifecycle collaborator
    ///
    /// Idempotent; the first call wins. The device must already be
    /// released by the caller (teardown order: device, then ledger).
    pub fn finish(&mut self, reason: EndReason) {
        if self.finalized {
            debug!(attempt_id = %self.attempt.id, ?reason, "finish called twice, ignored");
            return;
        }
        self.finalized = true;

        let was_degraded = matches!(self.phase, SessionPhase::Ended { degraded: true });
        self.phase = SessionPhase::Ended {
            degraded: was_degraded,
        };
        self.ledger.seal();

        let attempt_id = self.attempt.id;
        let transition = match reason {
            EndReason::Submitted => self
                .attempt
                .submit()
                .and_then(|_| self.lifecycle.submit(attempt_id)),
            EndReason::AutoSubmitted => self
                .attempt
                .auto_submit()
                .and_then(|_| self.lifecycle.auto_submit(attempt_id)),
            EndReason::Terminated => {
                let reason_text = "violation limit reached";
                self.attempt
                    .terminate(reason_text)
                    .and_then(|_| self.lifecycle.terminate(attempt_id, reason_text))
            }
            // Cancellation leaves the attempt open; the platform decides
            // what becomes of it.
            EndReason::Cancelled => Ok(()),
        };
        if let Err(e) = transition {
            warn!(error = %e, "attempt lifecycle transition failed");
        }

        let terminate = reason == EndReason::Terminated;
        if let Err(e) = self.store.persist(&self.ledger, terminate) {
            error!(error = %e, "failed to persist sealed ledger");
        }

        info!(
            attempt_id = %attempt_id,
            ?reason,
            status = ?self.ledger.status(),
            events = self.ledger.total_events(),
            "proctoring session ended"
        );
    }

    fn append_all(&mut self, events: Vec<ViolationEvent>) -> Directive {
        for event in events {
            match self.ledger.append(event) {
                Ok(IntegrityStatus::Terminated) => {
                    return Directive::EndAttempt(EndReason::Terminated);
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "violation event dropped");
                }
            }
        }
        Directive::Continue
    }

    fn ai_status_for(obs: &TickObservation) -> AiStatus {
        match obs.face_count {
            FaceCount::None => AiStatus::NoFace,
            FaceCount::Many => AiStatus::MultipleFaces,
            FaceCount::One => match obs.gaze.map(|g| g.direction) {
                Some(GazeDirection::Away) => AiStatus::LookingAway,
                Some(GazeDirection::Down) => AiStatus::LookingDown,
                _ => AiStatus::Detecting,
            },
        }
    }
}
