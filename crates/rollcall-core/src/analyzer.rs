//! The face analysis capability: image in, detections with descriptors out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Detection;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds every face in an image and describes each one.
///
/// Detections come back in the order the detector ranks them
/// (highest confidence first).
pub trait FaceAnalyzer {
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<Detection>, AnalyzerError>;
}

/// SCRFD detection followed by ArcFace description.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxAnalyzer {
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<Detection>, AnalyzerError> {
        let faces = self.detector.detect(image)?;
        let mut detections = Vec::with_capacity(faces.len());

        for face in faces {
            match self.recognizer.extract(image, &face) {
                Ok(descriptor) => detections.push(Detection { region: face, descriptor }),
                // A face cut off by the frame edge is dropped, not fatal.
                Err(RecognizerError::EmptyCrop) => {
                    tracing::debug!(x = face.x, y = face.y, "face region outside frame, skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(detections)
    }
}
