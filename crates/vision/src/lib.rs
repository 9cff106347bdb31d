//! Proctoring Vision
//!
//! Face presence and gaze analysis over captured webcam frames:
//! - Pluggable face/landmark detection capability
//! - ONNX-backed detector with a deterministic heuristic fallback
//! - Pure gaze deviation heuristic (centered / away / down)

pub mod config;
pub mod detector;
pub mod gaze;

pub use config::VisionConfig;
pub use detector::{BoundingBox, DetectedFace, OnnxFaceClassifier};
pub use gaze::{GazeDirection, GazeObservation, GazeSample};

use frame_capture::Frame;
use thiserror::Error;

/// Model initialization failure
///
/// Recovered by degrading to event-only monitoring; never aborts the
/// attempt.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("model configuration invalid: {0}")]
    Config(String),
}

/// Per-frame inference failure
///
/// Transient. The caller treats the tick as "no observation": counters
/// neither advance nor decay. Must not be conflated with a genuine
/// zero-face detection.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("frame not decodable: {0}")]
    BadFrame(String),
}

/// Face detection capability
///
/// `load` runs once per session and is expensive; `infer` runs once per
/// sampled frame. Zero detections is a valid, non-error result. The
/// concrete vision model and runtime are swappable behind this trait
/// without touching the debouncer or the ledger.
pub trait FaceClassifier: Send {
    /// Initialize the model. Called once, before the first `infer`.
    fn load(&mut self) -> Result<(), LoadError>;

    /// Detect faces in one frame.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, InferenceError>;
}
