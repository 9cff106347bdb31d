//! Vision configuration

use serde::{Deserialize, Serialize};

/// Vision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Face detection confidence threshold
    pub face_confidence: f32,

    /// Horizontal deviation ratio beyond which gaze counts as "away"
    pub horizontal_away_ratio: f32,

    /// Vertical deviation ratio beyond which gaze counts as "down"
    pub vertical_down_ratio: f32,

    /// Path to the face detection model; heuristic fallback when absent
    pub model_path: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            face_confidence: 0.7,
            horizontal_away_ratio: 0.18,
            vertical_down_ratio: 0.38,
            model_path: None,
        }
    }
}

impl VisionConfig {
    /// Strict preset (smaller deviation tolerances)
    pub fn strict() -> Self {
        Self {
            horizontal_away_ratio: 0.12,
            vertical_down_ratio: 0.32,
            ..Default::default()
        }
    }

    /// Lenient preset (larger deviation tolerances)
    pub fn lenient() -> Self {
        Self {
            horizontal_away_ratio: 0.25,
            vertical_down_ratio: 0.45,
            ..Default::default()
        }
    }
}
