use crate::delivery::{Outbound, OutboundQueue};
use crate::status::{Phase, StatusBoard};
use parking_lot::Mutex;
use rollcall_core::{AttendanceEvent, Roster};
use std::sync::Arc;

/// Turns first-sighting events into counter updates and outbound notifications.
///
/// Local counters are updated before anything is queued; delivery outcomes
/// never feed back into them.
#[derive(Clone)]
pub struct Reconciler {
    roster: Arc<Mutex<Roster>>,
    status: StatusBoard,
    outbound: OutboundQueue,
}

impl Reconciler {
    pub fn new(roster: Arc<Mutex<Roster>>, status: StatusBoard, outbound: OutboundQueue) -> Self {
        Self { roster, status, outbound }
    }

    /// Count one first sighting and queue `MarkPresent` for it.
    ///
    /// Returns false when the label has no roster entry; nothing is counted
    /// or queued in that case.
    pub fn record(&self, event: &AttendanceEvent) -> bool {
        let student_id = {
            let mut roster = self.roster.lock();
            match roster.mark_present(&event.label) {
                Some(identity) => {
                    tracing::info!(
                        label = %identity.label,
                        id = %identity.id,
                        present = identity.present,
                        score = event.score,
                        session = %event.session_id,
                        "first sighting"
                    );
                    identity.id.clone()
                }
                None => {
                    tracing::warn!(label = %event.label, "recognized label has no roster entry; no attendance recorded");
                    return false;
                }
            }
        };

        self.status.set(Phase::Present(event.label.clone()));
        self.outbound.push(Outbound::MarkPresent { student_id });
        true
    }

    /// Queue `FaceLogin` for a recorded sighting. `snapshot` is the encoded
    /// frame the sighting came from.
    pub fn face_login(&self, event: &AttendanceEvent, snapshot: Option<&str>) {
        match snapshot {
            Some(image) => self.outbound.push(Outbound::FaceLogin { image: image.to_string() }),
            None => tracing::warn!(label = %event.label, "no snapshot available; face login skipped"),
        }
    }
}
