//! The periodic detection loop.
//!
//! Each tick runs one detection pass: sample a frame, match every face, let
//! the session tracker pick out first sightings, and hand those to the
//! reconciler. Passes are single-flight: a tick that fires while the previous
//! pass is still running is skipped.

use crate::engine::{EngineError, Sample, Vision};
use crate::reconciler::Reconciler;
use chrono::Utc;
use parking_lot::Mutex;
use rollcall_core::{AttendanceEvent, FaceMatcher, MatchOutcome, SessionTracker, TrackerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Everything one detection pass needs.
#[derive(Clone)]
pub struct PassContext<V> {
    pub vision: V,
    pub matcher: Arc<FaceMatcher>,
    pub tracker: Arc<Mutex<SessionTracker>>,
    pub reconciler: Reconciler,
    pub snapshot_quality: u8,
    /// Upper bound on acquiring and analysing one frame.
    pub sample_timeout: Duration,
}

/// Run one detection pass. Returns how many first sightings it produced.
///
/// Only the sample step can time out. Once the tracker has seen the
/// outcomes, every first sighting is counted before the pass yields.
pub async fn run_pass<V: Vision>(ctx: &PassContext<V>) -> Result<usize, EngineError> {
    if ctx.tracker.lock().state() != TrackerState::Ready {
        tracing::debug!("session not ready, tick skipped");
        return Ok(0);
    }

    let Sample { frame, detections } = tokio::time::timeout(ctx.sample_timeout, ctx.vision.sample())
        .await
        .map_err(|_| EngineError::Timeout(ctx.sample_timeout))??;

    let outcomes: Vec<MatchOutcome> = detections
        .iter()
        .map(|detection| {
            let outcome = ctx.matcher.match_descriptor(&detection.descriptor);
            let region = &detection.region;
            tracing::debug!(
                x = region.x,
                y = region.y,
                width = region.width,
                height = region.height,
                outcome = %outcome,
                "face"
            );
            outcome
        })
        .collect();

    // Check-and-insert happens under one lock; concurrent passes cannot both
    // claim the same first sighting.
    let events = ctx.tracker.lock().observe(&outcomes, Utc::now());
    let recorded: Vec<&AttendanceEvent> = events.iter().filter(|event| ctx.reconciler.record(event)).collect();
    if recorded.is_empty() {
        return Ok(events.len());
    }

    let quality = ctx.snapshot_quality;
    let snapshot = match tokio::task::spawn_blocking(move || frame.snapshot_data_url(quality)).await {
        Ok(Ok(url)) => Some(url),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "snapshot encoding failed");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "snapshot worker join failed");
            None
        }
    };

    for event in recorded {
        ctx.reconciler.face_login(event, snapshot.as_deref());
    }
    Ok(events.len())
}

/// Tick every `interval` until `cancel` fires, then wait out any in-flight pass.
pub async fn sampling_loop<V: Vision>(ctx: PassContext<V>, interval: Duration, cancel: CancellationToken) {
    let ctx = Arc::new(ctx);
    let gate = Arc::new(Semaphore::new(1));

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_ms = interval.as_millis() as u64, "sampler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Ok(permit) = Arc::clone(&gate).try_acquire_owned() else {
                    tracing::debug!("previous pass still running, tick skipped");
                    continue;
                };
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let _permit = permit;
                    match run_pass(&ctx).await {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!(events = n, "pass produced first sightings"),
                        Err(e) => tracing::warn!(error = %e, "detection pass failed"),
                    }
                });
            }
            _ = cancel.cancelled() => break,
        }
    }

    if gate.acquire().await.is_err() {
        tracing::warn!("sampler gate closed");
    }
    tracing::info!("sampler stopped");
}
