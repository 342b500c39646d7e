//! ArcFace face recognizer via ONNX Runtime.
//!
//! Crops a square region around a detected face, resizes it to 112x112 and
//! extracts an L2-normalized 512-dimensional descriptor (w600k_r50).

use crate::types::{BoundingBox, Embedding};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: u32 = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
const ARCFACE_EMBEDDING_DIM: usize = 512;
/// Margin added around the detector box before cropping.
const CROP_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download from insightface and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region lies outside the frame")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based descriptor extractor.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded ArcFace model");
        Ok(Self { session })
    }

    /// Extract the descriptor for `face` within `frame`.
    pub fn extract(&mut self, frame: &RgbImage, face: &BoundingBox) -> Result<Embedding, RecognizerError> {
        let (x, y, side) = square_crop(face, frame.width(), frame.height()).ok_or(RecognizerError::EmptyCrop)?;
        let crop = imageops::crop_imm(frame, x, y, side, side).to_image();
        let aligned = imageops::resize(&crop, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE, FilterType::Triangle);

        let input = preprocess(&aligned);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

/// Square crop (x, y, side) centred on `face`, clamped to the frame.
fn square_crop(face: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32)> {
    let side = face.width.max(face.height) * (1.0 + CROP_MARGIN);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).max(0.0);
    let y0 = (cy - side / 2.0).max(0.0);
    let x1 = (cx + side / 2.0).min(width as f32);
    let y1 = (cy + side / 2.0).min(height as f32);

    let clamped = (x1 - x0).min(y1 - y0).floor();
    if clamped < 1.0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, clamped as u32))
}

fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let size = ARCFACE_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    #[test]
    fn test_square_crop_inside_frame() {
        let (x, y, side) = square_crop(&face(100.0, 100.0, 50.0, 100.0), 640, 480).unwrap();
        assert_eq!(side, 110);
        assert_eq!((x, y), (70, 95));
    }

    #[test]
    fn test_square_crop_clamped_at_edge() {
        let (x, y, side) = square_crop(&face(-20.0, -20.0, 60.0, 60.0), 640, 480).unwrap();
        assert_eq!((x, y), (0, 0));
        assert!(side <= 43);
    }

    #[test]
    fn test_square_crop_outside_frame() {
        assert!(square_crop(&face(700.0, 500.0, 40.0, 40.0), 640, 480).is_none());
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let aligned = RgbImage::from_pixel(112, 112, image::Rgb([255, 0, 128]));
        let tensor = preprocess(&aligned);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert!((tensor[[0, 0, 5, 5]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 5, 5]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 5, 5]] - (0.5 / 127.5)).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
