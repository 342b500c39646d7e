//! Human-readable phase reporting.

use std::fmt;
use tokio::sync::watch;

/// Current phase of the daemon, as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ModelsLoading,
    ModelsUnavailable,
    FacesLoading,
    FacesUnavailable,
    CameraStarting,
    CameraDenied,
    Ready,
    /// A first sighting was just recorded for this label.
    Present(String),
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::ModelsLoading => f.write_str("models-loading"),
            Phase::ModelsUnavailable => f.write_str("models-unavailable"),
            Phase::FacesLoading => f.write_str("faces-loading"),
            Phase::FacesUnavailable => f.write_str("faces-unavailable"),
            Phase::CameraStarting => f.write_str("camera-starting"),
            Phase::CameraDenied => f.write_str("camera-denied"),
            Phase::Ready => f.write_str("ready"),
            Phase::Present(label) => write!(f, "{label} is Present"),
            Phase::Stopped => f.write_str("stopped"),
        }
    }
}

/// Shared publisher for the current phase. Cheap to clone.
#[derive(Clone)]
pub struct StatusBoard {
    tx: watch::Sender<Phase>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Phase::Idle);
        Self { tx }
    }

    pub fn set(&self, phase: Phase) {
        tracing::info!(status = %phase, "status changed");
        self.tx.send_replace(phase);
    }

    pub fn current(&self) -> Phase {
        self.tx.borrow().clone()
    }

    /// Follow phase changes from now on.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
