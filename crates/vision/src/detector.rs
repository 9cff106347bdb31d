//! Face detection

use frame_capture::Frame;
use ndarray::Array4;
use ort::{GraphOptimizationLevel, Session};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{FaceClassifier, InferenceError, LoadError, VisionConfig};

/// Landmark index: candidate's right eye
pub const LANDMARK_RIGHT_EYE: usize = 0;
/// Landmark index: candidate's left eye
pub const LANDMARK_LEFT_EYE: usize = 1;
/// Landmark index: nose tip
pub const LANDMARK_NOSE: usize = 2;

/// Detector input resolution
const INPUT_SIZE: u32 = 128;

/// Floats per detection row in the model output:
/// score, cx, cy, w, h, then three (x, y) landmark pairs
const ROW_LEN: usize = 11;

/// Face bounding box in frame coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One detected face, discarded after classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    /// Ordered landmark points; indices fixed by the `LANDMARK_*` constants
    pub landmarks: Vec<(f32, f32)>,
    pub confidence: f32,
}

impl DetectedFace {
    /// Landmark at a fixed index, if the detector produced it
    pub fn landmark(&self, index: usize) -> Option<(f32, f32)> {
        self.landmarks.get(index).copied()
    }
}

/// ONNX-backed face classifier
///
/// When no model path is configured the classifier degrades to a
/// deterministic heuristic that reports one centered face, which keeps the
/// rest of the pipeline exercisable without model assets.
pub struct OnnxFaceClassifier {
    confidence_threshold: f32,
    model_path: Option<String>,
    session: Option<Session>,
}

impl OnnxFaceClassifier {
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            confidence_threshold: config.face_confidence,
            model_path: config.model_path.clone(),
            session: None,
        }
    }

    fn preprocess(frame: &Frame) -> Result<Array4<f32>, InferenceError> {
        let img = image::ImageBuffer::<image::Rgb<u8>, _>::from_raw(
            frame.width,
            frame.height,
            frame.data.as_slice(),
        )
        .ok_or_else(|| InferenceError::BadFrame("pixel buffer does not match dimensions".into()))?;

        let resized = image::imageops::resize(
            &img,
            INPUT_SIZE,
            INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );

        // Normalize to -1..1, NCHW layout
        let mut input = Array4::<f32>::zeros((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = (pixel[0] as f32 / 127.5) - 1.0;
            input[[0, 1, y as usize, x as usize]] = (pixel[1] as f32 / 127.5) - 1.0;
            input[[0, 2, y as usize, x as usize]] = (pixel[2] as f32 / 127.5) - 1.0;
        }
        Ok(input)
    }

    /// Fallback detection when no model is configured
    fn heuristic_face(frame: &Frame) -> DetectedFace {
        let w = frame.width as f32;
        let h = frame.height as f32;
        DetectedFace {
            bbox: BoundingBox {
                x: w * 0.3,
                y: h * 0.2,
                width: w * 0.4,
                height: h * 0.5,
            },
            landmarks: vec![
                (w * 0.6, h * 0.38), // right eye
                (w * 0.4, h * 0.38), // left eye
                (w * 0.5, h * 0.52), // nose
            ],
            confidence: 0.9,
        }
    }
}

impl FaceClassifier for OnnxFaceClassifier {
    fn load(&mut self) -> Result<(), LoadError> {
        let Some(path) = self.model_path.clone() else {
            warn!("no face model configured, using heuristic detection");
            return Ok(());
        };

        info!(path = %path, "loading face detection model");
        let session = Session::builder()
            .map_err(|e| LoadError::ModelLoad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| LoadError::ModelLoad(e.to_string()))?
            .commit_from_file(&path)
            .map_err(|e| LoadError::ModelLoad(e.to_string()))?;

        self.session = Some(session);
        Ok(())
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, InferenceError> {
        let Some(session) = &self.session else {
            return Ok(vec![Self::heuristic_face(frame)]);
        };

        let input = Self::preprocess(frame)?;
        let outputs = session
            .run(ort::inputs![input].map_err(|e| InferenceError::Inference(e.to_string()))?)
            .map_err(|e| InferenceError::Inference(e.to_string()))?;

        let tensor = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Inference(e.to_string()))?;
        let flat: Vec<f32> = tensor.iter().copied().collect();

        Ok(decode_detections(
            &flat,
            frame.width as f32,
            frame.height as f32,
            self.confidence_threshold,
        ))
    }
}

/// Decode raw detector output into faces in frame coordinates
///
/// The detector head emits fixed-length rows of normalized values; rows
/// under the confidence threshold are discarded.
fn decode_detections(
    raw: &[f32],
    frame_width: f32,
    frame_height: f32,
    confidence_threshold: f32,
) -> Vec<DetectedFace> {
    raw.chunks_exact(ROW_LEN)
        .filter(|row| row[0] >= confidence_threshold)
        .map(|row| {
            let cx = row[1] * frame_width;
            let cy = row[2] * frame_height;
            let width = row[3] * frame_width;
            let height = row[4] * frame_height;
            let landmarks = (0..3)
                .map(|i| {
                    (
                        row[5 + i * 2] * frame_width,
                        row[6 + i * 2] * frame_height,
                    )
                })
                .collect();
            DetectedFace {
                bbox: BoundingBox {
                    x: cx - width / 2.0,
                    y: cy - height / 2.0,
                    width,
                    height,
                },
                landmarks,
                confidence: row[0],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(score: f32) -> Vec<f32> {
        vec![score, 0.5, 0.5, 0.4, 0.5, 0.6, 0.4, 0.4, 0.4, 0.5, 0.55]
    }

    #[test]
    fn test_decode_applies_confidence_threshold() {
        let mut raw = row(0.95);
        raw.extend(row(0.3));

        let faces = decode_detections(&raw, 640.0, 480.0, 0.7);
        assert_eq!(faces.len(), 1);
        assert!((faces[0].confidence - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_scales_to_frame() {
        let faces = decode_detections(&row(0.9), 640.0, 480.0, 0.7);
        let face = &faces[0];

        assert!((face.bbox.width - 256.0).abs() < 0.01);
        assert!((face.bbox.height - 240.0).abs() < 0.01);
        assert_eq!(face.landmark(LANDMARK_NOSE), Some((320.0, 264.0)));
    }

    #[test]
    fn test_decode_ignores_trailing_partial_row() {
        let mut raw = row(0.9);
        raw.extend([0.8, 0.1, 0.2]);

        let faces = decode_detections(&raw, 640.0, 480.0, 0.7);
        assert_eq!(faces.len(), 1);
    }

    #[test]
    fn test_heuristic_fallback_detects_one_face() {
        let mut classifier = OnnxFaceClassifier::new(&VisionConfig::default());
        classifier.load().unwrap();

        let frame = Frame::new(vec![0; 640 * 480 * 3], 640, 480, 0, 0);
        let faces = classifier.infer(&frame).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].landmarks.len(), 3);
    }
}
