//! Matching a probe descriptor against the gallery.
//!
//! Each gallery entry is scored over its whole descriptor set (mean distance
//! or mean similarity) and the best-scoring entry wins if it clears the
//! threshold. Anything else is `Unknown`.

use crate::types::{Embedding, Gallery, GalleryEntry};
use std::fmt;
use std::str::FromStr;

/// Result of matching one detection against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Known { label: String, score: f32 },
    Unknown,
}

impl MatchOutcome {
    pub fn label(&self) -> Option<&str> {
        match self {
            MatchOutcome::Known { label, .. } => Some(label),
            MatchOutcome::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, MatchOutcome::Known { .. })
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOutcome::Known { label, score } => write!(f, "{label} ({score:.2})"),
            MatchOutcome::Unknown => f.write_str("unknown"),
        }
    }
}

/// Strategy for comparing a probe descriptor against a gallery.
///
/// Must never fail for a well-formed descriptor: no match is `Unknown`.
pub trait Matcher: Send + Sync {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], threshold: f32) -> MatchOutcome;
}

/// Mean Euclidean distance per entry; lower is better, match if `< threshold`.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], threshold: f32) -> MatchOutcome {
        let best = gallery
            .iter()
            .filter_map(|entry| {
                mean(entry.descriptors.iter().map(|d| probe.euclidean_distance(d)))
                    .map(|dist| (entry, dist))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((entry, dist)) if dist < threshold => MatchOutcome::Known {
                label: entry.label.clone(),
                score: dist,
            },
            _ => MatchOutcome::Unknown,
        }
    }
}

/// Mean cosine similarity per entry; higher is better, match if `>= threshold`.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], threshold: f32) -> MatchOutcome {
        let best = gallery
            .iter()
            .filter_map(|entry| {
                mean(entry.descriptors.iter().map(|d| probe.similarity(d))).map(|sim| (entry, sim))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((entry, sim)) if sim >= threshold => MatchOutcome::Known {
                label: entry.label.clone(),
                score: sim,
            },
            _ => MatchOutcome::Unknown,
        }
    }
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Which comparison the adapter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMetric {
    Euclidean,
    Cosine,
}

impl FromStr for MatchMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" => Ok(MatchMetric::Euclidean),
            "cosine" => Ok(MatchMetric::Cosine),
            other => Err(format!("unknown match metric: {other}")),
        }
    }
}

/// Stable matching interface over a fixed gallery and threshold.
pub struct FaceMatcher {
    gallery: Gallery,
    threshold: f32,
    matcher: Box<dyn Matcher>,
}

impl FaceMatcher {
    pub fn new(gallery: Gallery, metric: MatchMetric, threshold: f32) -> Self {
        let matcher: Box<dyn Matcher> = match metric {
            MatchMetric::Euclidean => Box::new(EuclideanMatcher),
            MatchMetric::Cosine => Box::new(CosineMatcher),
        };
        Self { gallery, threshold, matcher }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Best label for `descriptor`, or `Unknown`.
    pub fn match_descriptor(&self, descriptor: &Embedding) -> MatchOutcome {
        self.matcher
            .compare(descriptor, self.gallery.entries(), self.threshold)
    }
}
