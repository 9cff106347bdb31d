//! Gaze deviation heuristic
//!
//! Pure geometry over one detected face's landmarks. No state: temporal
//! smoothing and debouncing live downstream.

use serde::{Deserialize, Serialize};

use crate::detector::{DetectedFace, LANDMARK_LEFT_EYE, LANDMARK_NOSE, LANDMARK_RIGHT_EYE};
use crate::VisionConfig;

/// Geometry below this size is unreliable, not "centered"
const MIN_FACE_EXTENT: f32 = 1.0;

/// Measured gaze deviation for one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// |noseX - eye midpoint X| / face width
    pub horizontal_ratio: f32,
    /// (noseY - eye midpoint Y) / face height
    pub vertical_ratio: f32,
}

/// Classified gaze direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    Centered,
    Away,
    Down,
}

/// Sample plus its classification, fed to the debouncer each valid tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeObservation {
    pub sample: GazeSample,
    pub direction: GazeDirection,
}

/// Measure gaze deviation from one face's landmarks
///
/// Returns `None` on degenerate geometry (missing landmarks, near-zero
/// face extent). The caller skips the tick rather than feeding a zero
/// deviation downstream, which would falsely read as "centered".
pub fn sample(face: &DetectedFace) -> Option<GazeSample> {
    let (right_eye_x, right_eye_y) = face.landmark(LANDMARK_RIGHT_EYE)?;
    let (left_eye_x, left_eye_y) = face.landmark(LANDMARK_LEFT_EYE)?;
    let (nose_x, nose_y) = face.landmark(LANDMARK_NOSE)?;

    if face.bbox.width < MIN_FACE_EXTENT || face.bbox.height < MIN_FACE_EXTENT {
        return None;
    }

    let eye_mid_x = (right_eye_x + left_eye_x) / 2.0;
    let eye_mid_y = (right_eye_y + left_eye_y) / 2.0;

    Some(GazeSample {
        horizontal_ratio: (nose_x - eye_mid_x).abs() / face.bbox.width,
        vertical_ratio: (nose_y - eye_mid_y) / face.bbox.height,
    })
}

/// Classify a sample against the configured deviation thresholds
///
/// Horizontal deviation wins when both thresholds are exceeded.
pub fn classify(sample: &GazeSample, config: &VisionConfig) -> GazeDirection {
    if sample.horizontal_ratio > config.horizontal_away_ratio {
        GazeDirection::Away
    } else if sample.vertical_ratio > config.vertical_down_ratio {
        GazeDirection::Down
    } else {
        GazeDirection::Centered
    }
}

/// Measure and classify in one step
pub fn observe(face: &DetectedFace, config: &VisionConfig) -> Option<GazeObservation> {
    let sample = sample(face)?;
    Some(GazeObservation {
        sample,
        direction: classify(&sample, config),
    })
}
