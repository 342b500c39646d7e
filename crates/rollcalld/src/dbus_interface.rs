use crate::engine::EngineHandle;
use crate::session::SessionController;
use crate::status::Phase;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use zbus::interface;
use zbus::object_server::SignalEmitter;

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    controller: Arc<Mutex<SessionController<EngineHandle>>>,
}

impl AttendanceService {
    pub fn new(controller: Arc<Mutex<SessionController<EngineHandle>>>) -> Self {
        Self { controller }
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Start a recognition session. Returns the session id.
    async fn start_session(&self) -> zbus::fdo::Result<String> {
        tracing::info!("start_session requested");
        let mut controller = self.controller.lock().await;
        controller
            .start()
            .await
            .map(|id| id.to_string())
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Stop the running session. Returns its summary as JSON.
    async fn stop_session(&self) -> zbus::fdo::Result<String> {
        tracing::info!("stop_session requested");
        let mut controller = self.controller.lock().await;
        let summary = controller
            .stop()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        to_json(&summary)
    }

    /// Current phase, gallery labels and session summary as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let report = self.controller.lock().await.report();
        to_json(&report)
    }

    /// Enrolled identities with their attendance counters as JSON.
    async fn roster(&self) -> zbus::fdo::Result<String> {
        let identities = self.controller.lock().await.roster();
        to_json(&identities)
    }

    /// Emitted with the operator text of every new phase.
    #[zbus(signal)]
    async fn phase_changed(emitter: &SignalEmitter<'_>, phase: &str) -> zbus::Result<()>;
}

/// Re-emit status changes as `PhaseChanged` until the board is dropped.
pub async fn forward_phases(conn: zbus::Connection, path: &'static str, mut phases: watch::Receiver<Phase>) {
    let emitter = match SignalEmitter::new(&conn, path) {
        Ok(emitter) => emitter,
        Err(e) => {
            tracing::warn!(error = %e, "cannot emit phase signals");
            return;
        }
    };
    while phases.changed().await.is_ok() {
        let phase = phases.borrow_and_update().to_string();
        if let Err(e) = AttendanceService::phase_changed(&emitter, &phase).await {
            tracing::warn!(error = %e, phase = %phase, "failed to emit PhaseChanged");
        }
    }
}
