use crate::engine::Vision;
use crate::status::{Phase, StatusBoard};
use rollcall_core::{Gallery, ReferenceImage};

/// Build the gallery once at startup, reporting progress on `status`.
///
/// Never fails: an engine error or a gallery with no faces leaves the
/// daemon in `faces-unavailable` with an empty gallery.
pub async fn load_gallery<V: Vision>(vision: &V, references: Vec<ReferenceImage>, status: &StatusBoard) -> Gallery {
    status.set(Phase::FacesLoading);
    let requested = references.len();

    let gallery = match vision.load_gallery(references).await {
        Ok(gallery) => gallery,
        Err(e) => {
            tracing::warn!(error = %e, "gallery load failed");
            Gallery::default()
        }
    };

    if gallery.is_empty() {
        tracing::warn!(requested, "no reference faces could be loaded");
        status.set(Phase::FacesUnavailable);
    } else {
        let labels: Vec<&str> = gallery.labels().collect();
        tracing::info!(loaded = gallery.len(), requested, labels = ?labels, "gallery ready");
    }
    gallery
}
