//! Session recognition tracking.
//!
//! A [`SessionTracker`] owns the set of labels already seen in one session
//! and turns per-tick match outcomes into first-sighting events. Inserting a
//! label into the set is the only place a first sighting is decided, so a
//! label yields at most one event per tracker no matter how often it is seen.

use crate::matcher::MatchOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerState {
    /// Created, no video yet.
    Idle,
    /// Session resources being acquired: gallery check, then the camera.
    /// Models and gallery themselves load once at daemon start.
    Loading,
    /// Video running, sampler armed.
    Ready,
    /// Camera or model failure; terminal.
    Failed,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackerState::Idle => "idle",
            TrackerState::Loading => "loading",
            TrackerState::Ready => "ready",
            TrackerState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TrackerError {
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: TrackerState, to: TrackerState },
}

/// First sighting of an enrolled label within a session.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceEvent {
    pub session_id: Uuid,
    pub label: String,
    pub score: f32,
    pub at: DateTime<Utc>,
}

/// What a finished (or running) session saw.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub state: TrackerState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Labels in first-sighting order.
    pub recognized: Vec<String>,
}

#[derive(Debug)]
pub struct SessionTracker {
    id: Uuid,
    started_at: DateTime<Utc>,
    state: TrackerState,
    enrolled: HashSet<String>,
    recognized: HashSet<String>,
    order: Vec<String>,
}

impl SessionTracker {
    /// Start tracking a new session over the given enrolled labels.
    pub fn new<I, S>(enrolled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: TrackerState::Idle,
            enrolled: enrolled.into_iter().map(Into::into).collect(),
            recognized: HashSet::new(),
            order: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn recognized(&self) -> &HashSet<String> {
        &self.recognized
    }

    pub fn begin_loading(&mut self) -> Result<(), TrackerError> {
        self.transition(TrackerState::Idle, TrackerState::Loading)
    }

    pub fn arm(&mut self) -> Result<(), TrackerError> {
        self.transition(TrackerState::Loading, TrackerState::Ready)
    }

    /// Move to the terminal failed state from anywhere.
    pub fn fail(&mut self) {
        self.state = TrackerState::Failed;
    }

    fn transition(&mut self, from: TrackerState, to: TrackerState) -> Result<(), TrackerError> {
        if self.state != from {
            return Err(TrackerError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    /// Consume one tick's outcomes, in detection order.
    ///
    /// Returns an event for each enrolled label not seen before in this
    /// session. Outside `Ready` the tick is a no-op. `Unknown` outcomes and
    /// labels outside the enrolled set never produce events.
    pub fn observe(&mut self, outcomes: &[MatchOutcome], at: DateTime<Utc>) -> Vec<AttendanceEvent> {
        if self.state != TrackerState::Ready {
            return Vec::new();
        }

        let mut events = Vec::new();
        for outcome in outcomes {
            let MatchOutcome::Known { label, score } = outcome else {
                continue;
            };
            if !self.enrolled.contains(label) {
                tracing::warn!(label = %label, "match for a label outside the gallery ignored");
                continue;
            }
            if self.recognized.insert(label.clone()) {
                self.order.push(label.clone());
                events.push(AttendanceEvent {
                    session_id: self.id,
                    label: label.clone(),
                    score: *score,
                    at,
                });
            }
        }
        events
    }

    pub fn summary(&self, ended_at: Option<DateTime<Utc>>) -> SessionSummary {
        SessionSummary {
            id: self.id,
            state: self.state,
            started_at: self.started_at,
            ended_at,
            recognized: self.order.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(label: &str) -> MatchOutcome {
        MatchOutcome::Known { label: label.into(), score: 0.2 }
    }

    fn ready_tracker() -> SessionTracker {
        let mut tracker = SessionTracker::new(["alice", "bob"]);
        tracker.begin_loading().unwrap();
        tracker.arm().unwrap();
        tracker
    }

    fn labels(events: &[AttendanceEvent]) -> Vec<&str> {
        events.iter().map(|e| e.label.as_str()).collect()
    }

    #[test]
    fn test_first_sighting_only() {
        let mut tracker = ready_tracker();
        let now = Utc::now();

        let tick1 = tracker.observe(&[known("alice")], now);
        assert_eq!(labels(&tick1), vec!["alice"]);

        let tick2 = tracker.observe(&[known("alice"), known("bob")], now);
        assert_eq!(labels(&tick2), vec!["bob"]);

        let tick3 = tracker.observe(&[known("alice")], now);
        assert!(tick3.is_empty());
        assert_eq!(tracker.summary(None).recognized, vec!["alice", "bob"]);
    }

    #[test]
    fn test_same_label_twice_in_one_tick() {
        let mut tracker = ready_tracker();
        let events = tracker.observe(&[known("alice"), known("alice")], Utc::now());
        assert_eq!(labels(&events), vec!["alice"]);
    }

    #[test]
    fn test_two_new_labels_keep_detection_order() {
        let mut tracker = ready_tracker();
        let events = tracker.observe(&[known("bob"), MatchOutcome::Unknown, known("alice")], Utc::now());
        assert_eq!(labels(&events), vec!["bob", "alice"]);
        assert!(events.iter().all(|e| e.session_id == tracker.id()));
    }

    #[test]
    fn test_unknown_and_unenrolled_never_emit() {
        let mut tracker = ready_tracker();
        let events = tracker.observe(&[MatchOutcome::Unknown, known("mallory")], Utc::now());
        assert!(events.is_empty());
        assert!(tracker.recognized().is_empty());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let ticks = vec![vec![known("alice")], vec![known("bob"), known("alice")], vec![MatchOutcome::Unknown]];
        let mut once = ready_tracker();
        for tick in &ticks {
            once.observe(tick, Utc::now());
        }

        let mut twice = ready_tracker();
        let mut total = 0;
        for _ in 0..2 {
            for tick in &ticks {
                total += twice.observe(tick, Utc::now()).len();
            }
        }

        assert_eq!(total, 2);
        assert_eq!(once.recognized(), twice.recognized());
    }

    #[test]
    fn test_not_ready_tick_is_noop() {
        let mut tracker = SessionTracker::new(["alice"]);
        assert!(tracker.observe(&[known("alice")], Utc::now()).is_empty());
        tracker.begin_loading().unwrap();
        assert!(tracker.observe(&[known("alice")], Utc::now()).is_empty());
        assert!(tracker.recognized().is_empty());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut tracker = SessionTracker::new(["alice"]);
        tracker.begin_loading().unwrap();
        tracker.fail();
        assert_eq!(
            tracker.arm(),
            Err(TrackerError::InvalidTransition { from: TrackerState::Failed, to: TrackerState::Ready })
        );
        assert!(tracker.observe(&[known("alice")], Utc::now()).is_empty());
    }

    #[test]
    fn test_new_session_starts_empty() {
        let mut first = ready_tracker();
        first.observe(&[known("alice")], Utc::now());
        let mut second = ready_tracker();
        assert_ne!(first.id(), second.id());
        assert_eq!(labels(&second.observe(&[known("alice")], Utc::now())), vec!["alice"]);
    }
}
