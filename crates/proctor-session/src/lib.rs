//! Proctor Session
//!
//! Orchestrates one attempt's proctoring lifecycle:
//! - Parallel device + model acquisition with degraded fallback
//! - The bounded-rate sampling/classification loop
//! - Serialized intake of browser-originated signals
//! - Idempotent teardown: release device, seal ledger, persist, notify
//!
//! The state machine core ([`engine::SessionEngine`]) is synchronous; the
//! async controller drives it from a single `select!` loop, so vision
//! ticks and browser events are serialized onto one queue and ledger
//! append order is the observable ordering.

pub mod controller;
pub mod engine;
pub mod status;

pub use controller::{ProctorSessionController, SessionCommand, SessionHandle, SessionReport};
pub use engine::{Directive, EndReason, SessionEngine, SessionPhase};
pub use status::{AiStatus, CameraPermission, ProctorStatus, StatusFeed};

use frame_capture::CaptureConstraints;
use integrity_ledger::EscalationPolicy;
use serde::{Deserialize, Serialize};
use violation_engine::DebounceConfig;
use vision::VisionConfig;

/// Session configuration bundle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(skip)]
    pub constraints: CaptureConstraints,
    pub vision: VisionConfig,
    pub debounce: DebounceConfig,
    pub escalation: EscalationPolicy,
}

impl SessionConfig {
    /// Strict preset across every layer
    pub fn strict() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            vision: VisionConfig::strict(),
            debounce: DebounceConfig::strict(),
            escalation: EscalationPolicy::strict(),
        }
    }

    /// Lenient preset across every layer
    pub fn lenient() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            vision: VisionConfig::lenient(),
            debounce: DebounceConfig::lenient(),
            escalation: EscalationPolicy::lenient(),
        }
    }
}
