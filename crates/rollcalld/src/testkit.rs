//! Fakes shared by the daemon's async tests.

use crate::backend::{AttendanceBackend, BackendError};
use crate::engine::{EngineError, Sample, Vision};
use parking_lot::Mutex;
use rollcall_core::{BoundingBox, Detection, Embedding, Gallery, GalleryEntry, ReferenceImage};
use rollcall_hw::{CameraError, Frame};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn detection(descriptor: &[f32]) -> Detection {
    Detection {
        region: BoundingBox { x: 10.0, y: 10.0, width: 40.0, height: 40.0, confidence: 0.9 },
        descriptor: Embedding::new(descriptor.to_vec()),
    }
}

pub fn gallery<const N: usize>(entries: &[(&str, [f32; N])]) -> Gallery {
    Gallery::new(
        entries
            .iter()
            .map(|(label, d)| GalleryEntry {
                label: label.to_string(),
                descriptors: vec![Embedding::new(d.to_vec())],
            })
            .collect(),
    )
}

/// Poll `cond` for up to two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

#[derive(Default)]
pub struct FakeState {
    pub gallery: Mutex<Gallery>,
    script: Mutex<VecDeque<Vec<Detection>>>,
    repeat: Mutex<Vec<Detection>>,
    delay: Mutex<Duration>,
    frame_size: Mutex<Option<(u32, u32)>>,
    failures_left: AtomicUsize,
    pub deny_camera: AtomicBool,
    pub gallery_loads: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub samples: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

/// Scripted vision: returns queued detection batches, then a repeating batch.
#[derive(Clone, Default)]
pub struct FakeVision {
    state: Arc<FakeState>,
}

impl FakeVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FakeState {
        &self.state
    }

    pub fn with_gallery(gallery: Gallery) -> Self {
        let vision = Self::new();
        *vision.state.gallery.lock() = gallery;
        vision
    }

    pub fn script(&self, batches: Vec<Vec<Detection>>) {
        self.state.script.lock().extend(batches);
    }

    pub fn repeat(&self, batch: Vec<Detection>) {
        *self.state.repeat.lock() = batch;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }

    /// Size of sampled frames; 8x8 unless set.
    pub fn set_frame_size(&self, width: u32, height: u32) {
        *self.state.frame_size.lock() = Some((width, height));
    }

    pub fn fail_samples(&self, count: usize) {
        self.state.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn deny_camera(&self) {
        self.state.deny_camera.store(true, Ordering::SeqCst);
    }
}

impl Vision for FakeVision {
    async fn load_gallery(&self, _references: Vec<ReferenceImage>) -> Result<Gallery, EngineError> {
        self.state.gallery_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.gallery.lock().clone())
    }

    async fn open_camera(&self) -> Result<(), EngineError> {
        if self.state.deny_camera.load(Ordering::SeqCst) {
            return Err(EngineError::Camera(CameraError::PermissionDenied("/dev/video0".into())));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sample(&self) -> Result<Sample, EngineError> {
        let state = &self.state;
        let seq = state.samples.fetch_add(1, Ordering::SeqCst);
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *state.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = state
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let detections = {
            let mut script = state.script.lock();
            script.pop_front().unwrap_or_else(|| state.repeat.lock().clone())
        };
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        if failing {
            return Err(EngineError::CameraClosed);
        }
        let (width, height) = state.frame_size.lock().unwrap_or((8, 8));
        Ok(Sample {
            frame: Frame::from_rgb(vec![128u8; (width * height * 3) as usize], width, height, seq as u32),
            detections,
        })
    }

    async fn close_camera(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backend that records calls and can be told to reject `mark_present`.
#[derive(Default)]
pub struct RecordingBackend {
    pub reject_mark: AtomicBool,
    pub marks: Mutex<Vec<String>>,
    pub logins: AtomicUsize,
}

impl AttendanceBackend for RecordingBackend {
    async fn mark_present(&self, student_id: &str) -> Result<Value, BackendError> {
        self.marks.lock().push(student_id.to_string());
        if self.reject_mark.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected { status: 500, body: json!({ "success": false, "msg": "db down" }) });
        }
        Ok(json!({ "success": true }))
    }

    async fn face_login(&self, _image: &str) -> Result<Value, BackendError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "success": true }))
    }
}
