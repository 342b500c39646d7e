//! Explicit session lifecycle.
//!
//! A session is bounded by `start` and `stop`. Each start builds a fresh
//! tracker with an empty recognition set; roster counters carry over from
//! one session to the next.

use crate::delivery::OutboundQueue;
use crate::engine::{EngineError, Vision};
use crate::reconciler::Reconciler;
use crate::sampler::{sampling_loop, PassContext};
use crate::status::{Phase, StatusBoard};
use chrono::Utc;
use parking_lot::Mutex;
use rollcall_core::{FaceMatcher, Identity, Roster, SessionSummary, SessionTracker, TrackerError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a session is already running")]
    AlreadyActive,
    #[error("no session is running")]
    NotActive,
    #[error("no enrolled faces available")]
    NoGallery,
    #[error("camera unavailable: {0}")]
    Camera(#[source] EngineError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Per-session tunables taken from the daemon configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub sample_interval: Duration,
    pub sample_timeout: Duration,
    pub snapshot_quality: u8,
    pub mark_absent_on_stop: bool,
}

struct ActiveSession {
    tracker: Arc<Mutex<SessionTracker>>,
    cancel: CancellationToken,
    sampler: JoinHandle<()>,
}

/// Snapshot of daemon state for status queries.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub phase: String,
    pub active: bool,
    pub gallery: Vec<String>,
    /// The running session, else the most recent one.
    pub session: Option<SessionSummary>,
}

pub struct SessionController<V: Vision> {
    vision: V,
    matcher: Arc<FaceMatcher>,
    roster: Arc<Mutex<Roster>>,
    status: StatusBoard,
    reconciler: Reconciler,
    settings: SessionSettings,
    active: Option<ActiveSession>,
    last: Option<SessionSummary>,
}

impl<V: Vision> SessionController<V> {
    pub fn new(
        vision: V,
        matcher: Arc<FaceMatcher>,
        roster: Arc<Mutex<Roster>>,
        status: StatusBoard,
        outbound: OutboundQueue,
        settings: SessionSettings,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&roster), status.clone(), outbound);
        Self {
            vision,
            matcher,
            roster,
            status,
            reconciler,
            settings,
            active: None,
            last: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Acquire the camera and arm the sampler for a new session.
    ///
    /// With an empty gallery the camera is never touched.
    pub async fn start(&mut self) -> Result<Uuid, SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        let gallery = self.matcher.gallery();
        let mut tracker = SessionTracker::new(gallery.labels().map(str::to_string).collect::<Vec<_>>());
        let id = tracker.id();
        tracker.begin_loading()?;

        if gallery.is_empty() {
            tracker.fail();
            self.last = Some(tracker.summary(Some(Utc::now())));
            self.status.set(Phase::FacesUnavailable);
            return Err(SessionError::NoGallery);
        }

        self.status.set(Phase::CameraStarting);
        if let Err(e) = self.vision.open_camera().await {
            tracing::warn!(session = %id, error = %e, permission_denied = e.is_permission_denied(), "camera acquisition failed");
            tracker.fail();
            self.last = Some(tracker.summary(Some(Utc::now())));
            self.status.set(Phase::CameraDenied);
            return Err(SessionError::Camera(e));
        }

        tracker.arm()?;
        let tracker = Arc::new(Mutex::new(tracker));
        let cancel = CancellationToken::new();

        let ctx = PassContext {
            vision: self.vision.clone(),
            matcher: Arc::clone(&self.matcher),
            tracker: Arc::clone(&tracker),
            reconciler: self.reconciler.clone(),
            snapshot_quality: self.settings.snapshot_quality,
            sample_timeout: self.settings.sample_timeout,
        };
        let sampler = tokio::spawn(sampling_loop(ctx, self.settings.sample_interval, cancel.clone()));

        self.active = Some(ActiveSession { tracker, cancel, sampler });
        self.status.set(Phase::Ready);
        tracing::info!(session = %id, "session started");
        Ok(id)
    }

    /// End the running session and release the camera.
    pub async fn stop(&mut self) -> Result<SessionSummary, SessionError> {
        let active = self.active.take().ok_or(SessionError::NotActive)?;

        active.cancel.cancel();
        if let Err(e) = active.sampler.await {
            tracing::warn!(error = %e, "sampler task ended abnormally");
        }
        self.vision.close_camera().await;

        let summary = {
            let tracker = active.tracker.lock();
            if self.settings.mark_absent_on_stop {
                let absent = self.roster.lock().mark_absent_except(tracker.recognized());
                if !absent.is_empty() {
                    tracing::info!(session = %tracker.id(), absent = ?absent, "marked absent");
                }
            }
            tracker.summary(Some(Utc::now()))
        };

        tracing::info!(
            session = %summary.id,
            recognized = summary.recognized.len(),
            "session stopped"
        );
        self.status.set(Phase::Stopped);
        self.last = Some(summary.clone());
        Ok(summary)
    }

    pub fn report(&self) -> StatusReport {
        let session = match &self.active {
            Some(active) => Some(active.tracker.lock().summary(None)),
            None => self.last.clone(),
        };
        StatusReport {
            phase: self.status.current().to_string(),
            active: self.active.is_some(),
            gallery: self.matcher.gallery().labels().map(str::to_string).collect(),
            session,
        }
    }

    pub fn roster(&self) -> Vec<Identity> {
        self.roster.lock().identities().to_vec()
    }
}
