//! Violation Engine
//!
//! Converts the continuous stream of per-tick proctoring classifications
//! into discrete, rate-limited violation events:
//! - Independent rise/decay counters per violation kind
//! - Cooldown windows so a sustained violation cannot flood the ledger
//! - Immediate (but storm-collapsed) firing for discrete browser signals

pub mod config;
pub mod counter;
pub mod debouncer;

pub use config::DebounceConfig;
pub use counter::{CounterOutcome, CounterPolicy, ViolationCounter};
pub use debouncer::{BrowserSignal, FaceCount, TickObservation, ViolationDebouncer};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Violation kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoFace,
    MultipleFaces,
    LookingAway,
    LookingDown,
    TabSwitch,
    FullscreenExit,
    CopyAttempt,
    RightClick,
    DevtoolsOpen,
    /// Audit annotation: camera/model unavailable, monitoring degraded
    DeviceUnavailable,
}

impl ViolationKind {
    /// Every kind, in a fixed order (counter arenas are pre-sized over this)
    pub const ALL: [ViolationKind; 10] = [
        ViolationKind::NoFace,
        ViolationKind::MultipleFaces,
        ViolationKind::LookingAway,
        ViolationKind::LookingDown,
        ViolationKind::TabSwitch,
        ViolationKind::FullscreenExit,
        ViolationKind::CopyAttempt,
        ViolationKind::RightClick,
        ViolationKind::DevtoolsOpen,
        ViolationKind::DeviceUnavailable,
    ];

    /// Storage/wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "no_face",
            ViolationKind::MultipleFaces => "multiple_faces",
            ViolationKind::LookingAway => "looking_away",
            ViolationKind::LookingDown => "looking_down",
            ViolationKind::TabSwitch => "tab_switch",
            ViolationKind::FullscreenExit => "fullscreen_exit",
            ViolationKind::CopyAttempt => "copy_attempt",
            ViolationKind::RightClick => "right_click",
            ViolationKind::DevtoolsOpen => "devtools_open",
            ViolationKind::DeviceUnavailable => "device_unavailable",
        }
    }

    /// Discrete kinds fire straight from browser events, bypassing the
    /// rise/decay counters
    pub fn is_discrete(&self) -> bool {
        matches!(
            self,
            ViolationKind::TabSwitch
                | ViolationKind::FullscreenExit
                | ViolationKind::CopyAttempt
                | ViolationKind::RightClick
                | ViolationKind::DevtoolsOpen
        )
    }
}

/// One value in a violation detail record
///
/// Details stay flat (strings, numbers, booleans only) for storage
/// portability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        DetailValue::Text(v.to_string())
    }
}

impl From<f64> for DetailValue {
    fn from(v: f64) -> Self {
        DetailValue::Number(v)
    }
}

impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        DetailValue::Flag(v)
    }
}

/// Flat key-value context attached to a violation event
pub type ViolationDetail = BTreeMap<String, DetailValue>;

/// Immutable violation fact
///
/// Appended exactly once to the attempt's integrity ledger; never mutated
/// or deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub attempt_id: Uuid,
    pub kind: ViolationKind,
    pub detail: ViolationDetail,
    pub occurred_at: DateTime<Utc>,
}

impl ViolationEvent {
    /// Create an event stamped with the current time
    pub fn now(attempt_id: Uuid, kind: ViolationKind, detail: ViolationDetail) -> Self {
        Self {
            attempt_id,
            kind,
            detail,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_snake_case() {
        assert_eq!(ViolationKind::NoFace.as_str(), "no_face");
        assert_eq!(ViolationKind::DevtoolsOpen.as_str(), "devtools_open");
    }

    #[test]
    fn test_serde_name_matches_as_str() {
        for kind in ViolationKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_discrete_partition() {
        let discrete = ViolationKind::ALL.iter().filter(|k| k.is_discrete()).count();
        assert_eq!(discrete, 5);
        assert!(!ViolationKind::NoFace.is_discrete());
        assert!(!ViolationKind::DeviceUnavailable.is_discrete());
    }

    #[test]
    fn test_detail_serializes_flat() {
        let mut detail = ViolationDetail::new();
        detail.insert("signal".into(), "tab_switch".into());
        detail.insert("horizontal_ratio".into(), 0.31.into());
        detail.insert("degraded".into(), false.into());

        let json = serde_json::to_string(&detail).unwrap();
        assert_eq!(
            json,
            r#"{"degraded":false,"horizontal_ratio":0.31,"signal":"tab_switch"}"#
        );
    }
}
