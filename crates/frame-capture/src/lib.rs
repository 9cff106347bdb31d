//! Webcam Frame Capture
//!
//! Owns the capture device lifecycle for a proctored attempt:
//! - Typed acquisition failures (permission, missing device, busy device)
//! - Bounded-rate, cancellable frame pulling
//! - Guaranteed track release on every exit path (RAII handle)

pub mod frame;
pub mod sampler;

pub use frame::Frame;
pub use sampler::{DeviceHandle, FrameSampler};

use thiserror::Error;

/// Device acquisition error types
///
/// All three variants are recoverable: the session falls back to
/// event-only monitoring instead of blocking the attempt.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no capture device available")]
    NoDevice,

    #[error("capture device busy: {0}")]
    DeviceBusy(String),
}

/// Camera facing preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Front camera, pointed at the candidate
    User,
    /// Rear camera
    Environment,
}

/// Requested capture parameters
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target sampling rate
    pub fps: u32,
    /// Facing preference
    pub facing: FacingMode,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            facing: FacingMode::User,
        }
    }
}

/// Capture device backend
///
/// The concrete device (browser media track, V4L2 device, test script) sits
/// behind this trait so the sampling loop and its tests never touch real
/// hardware directly.
pub trait CaptureBackend: Send {
    /// Open the device with the given constraints
    fn open(&mut self, constraints: &CaptureConstraints) -> Result<(), AcquisitionError>;

    /// Read the most recent frame, if one is ready
    ///
    /// `None` means no frame was decodable right now; the caller drops the
    /// tick instead of waiting.
    fn read_frame(&mut self) -> Option<Frame>;

    /// Release device tracks. Must be safe to call more than once.
    fn close(&mut self);
}
