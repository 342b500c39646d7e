//! Gallery loading from labelled reference images.
//!
//! Each reference image should contain one face. Images that cannot be read
//! or contain no detectable face are logged and left out; the load as a whole
//! never fails.

use crate::analyzer::FaceAnalyzer;
use crate::types::{Detection, Gallery, GalleryEntry};
use std::path::PathBuf;

/// A labelled reference image on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub label: String,
    pub path: PathBuf,
}

/// Build the gallery, one entry per reference that yields a face, in input order.
pub fn load_gallery<A: FaceAnalyzer + ?Sized>(analyzer: &mut A, references: &[ReferenceImage]) -> Gallery {
    let mut entries = Vec::with_capacity(references.len());

    for reference in references {
        let image = match image::open(&reference.path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(
                    label = %reference.label,
                    path = %reference.path.display(),
                    error = %e,
                    "failed to read reference image"
                );
                continue;
            }
        };

        let detections = match analyzer.detect_faces(&image) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(label = %reference.label, error = %e, "face analysis failed for reference image");
                continue;
            }
        };

        let Some(best) = best_face(detections) else {
            tracing::warn!(label = %reference.label, "no face detected in reference image");
            continue;
        };

        tracing::info!(
            label = %reference.label,
            confidence = best.region.confidence,
            "reference face enrolled"
        );
        entries.push(GalleryEntry {
            label: reference.label.clone(),
            descriptors: vec![best.descriptor],
        });
    }

    Gallery::new(entries)
}

/// The single face to enroll from a reference image: the most confident one.
fn best_face(detections: Vec<Detection>) -> Option<Detection> {
    detections
        .into_iter()
        .max_by(|a, b| a.region.confidence.total_cmp(&b.region.confidence))
}
