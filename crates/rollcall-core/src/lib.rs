//! rollcall-core: Face gallery, matching and session attendance tracking.
//!
//! Uses SCRFD for face detection and ArcFace for descriptors, both running
//! via ONNX Runtime for CPU inference. Everything else in this crate is
//! plain synchronous logic over those descriptors.

pub mod analyzer;
pub mod detector;
pub mod gallery;
pub mod matcher;
pub mod recognizer;
pub mod roster;
pub mod tracker;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer, OnnxAnalyzer};
pub use gallery::{load_gallery, ReferenceImage};
pub use matcher::{CosineMatcher, EuclideanMatcher, FaceMatcher, MatchMetric, MatchOutcome, Matcher};
pub use roster::{Identity, Roster};
pub use tracker::{AttendanceEvent, SessionSummary, SessionTracker, TrackerError, TrackerState};
pub use types::{BoundingBox, Detection, Embedding, Gallery, GalleryEntry};

use std::path::PathBuf;

/// Base data directory: `$XDG_DATA_HOME/rollcall`, else `~/.local/share/rollcall`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

/// Where the SCRFD and ArcFace ONNX files are expected by default.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}
