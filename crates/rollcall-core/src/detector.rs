//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB frame to 640x640, runs the 3-stride SCRFD model and
//! decodes anchor offsets back into frame coordinates, followed by NMS.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download from insightface and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("empty frame")]
    EmptyFrame,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied when fitting a frame into the model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (SCRFD_INPUT_SIZE as f32 / width as f32).min(SCRFD_INPUT_SIZE as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).min(SCRFD_INPUT_SIZE);
        let new_h = ((height as f32 * scale).round() as u32).min(SCRFD_INPUT_SIZE);
        Self {
            scale,
            pad_x: (SCRFD_INPUT_SIZE - new_w) / 2,
            pad_y: (SCRFD_INPUT_SIZE - new_h) / 2,
        }
    }

    /// Map a point in model-input space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Output slot per stride as (score, bbox), discovered at load time.
    stride_outputs: [(usize, usize); 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(path = model_path, outputs = ?output_names, "loaded SCRFD model");

        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_outputs = output_slots(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output mapping");

        Ok(Self { session, stride_outputs })
    }

    /// Detect faces in an RGB frame, highest confidence first.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectorError::EmptyFrame);
        }

        let letterbox = Letterbox::fit(frame.width(), frame.height());
        let input = preprocess(frame, &letterbox);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_outputs[pos];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(scores, bboxes, stride, &letterbox));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Resolve (score, bbox) output slots per stride.
///
/// Prefers `score_8`/`bbox_8`-style names; otherwise the standard export
/// order [scores 8/16/32, bboxes 8/16/32, kps 8/16/32].
fn output_slots(names: &[String]) -> [(usize, usize); 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<(usize, usize)>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?)))
        .collect();

    match named {
        Some(slots) => [slots[0], slots[1], slots[2]],
        None => [(0, 3), (1, 4), (2, 5)],
    }
}

/// Letterbox `frame` into a normalized NCHW tensor.
fn preprocess(frame: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let new_w = SCRFD_INPUT_SIZE - 2 * letterbox.pad_x;
    let new_h = SCRFD_INPUT_SIZE - 2 * letterbox.pad_y;
    let resized = imageops::resize(frame, new_w.max(1), new_h.max(1), FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    // Padding is zero after normalization, matching a SCRFD_MEAN fill.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = (x + letterbox.pad_x) as usize;
        let ty = (y + letterbox.pad_y) as usize;
        if tx >= size || ty >= size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    tensor
}

/// Decode candidate boxes above the confidence threshold for one stride.
fn decode_stride(scores: &[f32], bboxes: &[f32], stride: usize, letterbox: &Letterbox) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE as usize / stride;
    let step = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score > SCRFD_CONFIDENCE_THRESHOLD)
        .filter_map(|(idx, &score)| {
            let offsets = bboxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid_w) as f32 * step;
            let cy = (cell / grid_w) as f32 * step;

            let (x1, y1) = letterbox.unmap(cx - offsets[0] * step, cy - offsets[1] * step);
            let (x2, y2) = letterbox.unmap(cx + offsets[2] * step, cy + offsets[3] * step);

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if keep.iter().all(|kept| kept.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}
