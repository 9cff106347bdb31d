//! Live status projection for the presentation layer

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// What the vision pipeline currently sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStatus {
    #[default]
    Initializing,
    Detecting,
    NoFace,
    MultipleFaces,
    LookingAway,
    LookingDown,
}

/// Camera permission state shown to the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPermission {
    #[default]
    Prompt,
    Granted,
    Denied,
}

/// Read-only projection pushed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProctorStatus {
    pub ai: AiStatus,
    pub camera: CameraPermission,
}

/// Push-style status feed
///
/// Receivers observe the latest value; a new value is pushed only when
/// something actually changed.
pub struct StatusFeed {
    tx: watch::Sender<ProctorStatus>,
}

impl StatusFeed {
    pub fn new() -> (Self, watch::Receiver<ProctorStatus>) {
        let (tx, rx) = watch::channel(ProctorStatus::default());
        (Self { tx }, rx)
    }

    pub fn set_ai(&self, ai: AiStatus) {
        self.tx.send_if_modified(|status| {
            if status.ai == ai {
                false
            } else {
                status.ai = ai;
                true
            }
        });
    }

    pub fn set_camera(&self, camera: CameraPermission) {
        self.tx.send_if_modified(|status| {
            if status.camera == camera {
                false
            } else {
                status.camera = camera;
                true
            }
        });
    }

    /// Current projection
    pub fn current(&self) -> ProctorStatus {
        *self.tx.borrow()
    }
}
