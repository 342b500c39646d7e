use rollcall_core::{AnalyzerError, Detection, FaceAnalyzer, Gallery, OnnxAnalyzer, ReferenceImage};
use rollcall_hw::{Camera, CameraError, Frame};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("camera is not open")]
    CameraClosed,
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("frame data truncated ({width}x{height})")]
    BadFrame { width: u32, height: u32 },
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl EngineError {
    /// The camera refused access; reported to operators as `camera-denied`.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, EngineError::Camera(CameraError::PermissionDenied(_)))
    }
}

/// One sampled frame and every face found in it, in detector order.
pub struct Sample {
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

/// Vision capability used by sessions: gallery building, camera lifetime and sampling.
pub trait Vision: Clone + Send + Sync + 'static {
    fn load_gallery(&self, references: Vec<ReferenceImage>) -> impl Future<Output = Result<Gallery, EngineError>> + Send;
    fn open_camera(&self) -> impl Future<Output = Result<(), EngineError>> + Send;
    fn sample(&self) -> impl Future<Output = Result<Sample, EngineError>> + Send;
    fn close_camera(&self) -> impl Future<Output = ()> + Send;
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    LoadGallery {
        references: Vec<ReferenceImage>,
        reply: oneshot::Sender<Gallery>,
    },
    OpenCamera {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Sample {
        reply: oneshot::Sender<Result<Sample, EngineError>>,
    },
    CloseCamera {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

impl Vision for EngineHandle {
    async fn load_gallery(&self, references: Vec<ReferenceImage>) -> Result<Gallery, EngineError> {
        self.request(|reply| EngineRequest::LoadGallery { references, reply }).await
    }

    async fn open_camera(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::OpenCamera { reply }).await?
    }

    async fn sample(&self) -> Result<Sample, EngineError> {
        self.request(|reply| EngineRequest::Sample { reply }).await?
    }

    async fn close_camera(&self) {
        if self.request(|reply| EngineRequest::CloseCamera { reply }).await.is_err() {
            tracing::warn!("engine gone while closing camera");
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Both ONNX models are loaded up front so a missing model fails startup.
/// The camera is opened per session on request and released on close.
pub fn spawn_engine(
    scrfd_path: &str,
    arcface_path: &str,
    camera_device: &str,
    warmup_frames: usize,
) -> Result<EngineHandle, EngineError> {
    let analyzer = OnnxAnalyzer::load(scrfd_path, arcface_path)?;
    tracing::info!(scrfd = scrfd_path, arcface = arcface_path, "face models loaded");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let device = camera_device.to_string();

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut worker = Worker { analyzer, camera: None, device, warmup_frames };
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::LoadGallery { references, reply } => {
                        let _ = reply.send(rollcall_core::load_gallery(&mut worker.analyzer, &references));
                    }
                    EngineRequest::OpenCamera { reply } => {
                        let _ = reply.send(worker.open_camera());
                    }
                    EngineRequest::Sample { reply } => {
                        let _ = reply.send(worker.sample());
                    }
                    EngineRequest::CloseCamera { reply } => {
                        if worker.camera.take().is_some() {
                            tracing::info!(device = %worker.device, "camera released");
                        }
                        let _ = reply.send(());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

/// State owned by the engine thread.
struct Worker<A> {
    analyzer: A,
    camera: Option<Camera>,
    device: String,
    warmup_frames: usize,
}

impl<A: FaceAnalyzer> Worker<A> {
    fn open_camera(&mut self) -> Result<(), EngineError> {
        if self.camera.is_some() {
            return Ok(());
        }

        let camera = Camera::open(&self.device)?;
        tracing::info!(
            device = %self.device,
            width = camera.width,
            height = camera.height,
            fourcc = ?camera.fourcc,
            "camera opened"
        );

        // Discard warmup frames for AGC/AE stabilization
        if self.warmup_frames > 0 {
            tracing::debug!(count = self.warmup_frames, "discarding warmup frames");
            camera.warm_up(self.warmup_frames)?;
        }

        self.camera = Some(camera);
        Ok(())
    }

    fn sample(&mut self) -> Result<Sample, EngineError> {
        let camera = self.camera.as_ref().ok_or(EngineError::CameraClosed)?;
        let frame = camera.capture_frame()?;
        let detections = analyze_frame(&mut self.analyzer, &frame)?;
        Ok(Sample { frame, detections })
    }
}

/// Run face analysis on one frame. Dark frames yield no detections.
fn analyze_frame<A: FaceAnalyzer + ?Sized>(analyzer: &mut A, frame: &Frame) -> Result<Vec<Detection>, EngineError> {
    if frame.is_dark {
        tracing::debug!(sequence = frame.sequence, "dark frame skipped");
        return Ok(Vec::new());
    }

    let image = frame.to_rgb_image().ok_or(EngineError::BadFrame {
        width: frame.width,
        height: frame.height,
    })?;
    Ok(analyzer.detect_faces(&image)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use rollcall_core::{BoundingBox, Embedding};

    struct CountingAnalyzer {
        calls: usize,
    }

    impl FaceAnalyzer for CountingAnalyzer {
        fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<Detection>, AnalyzerError> {
            self.calls += 1;
            Ok(vec![Detection {
                region: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: image.width() as f32,
                    height: image.height() as f32,
                    confidence: 0.9,
                },
                descriptor: Embedding::new(vec![1.0, 0.0]),
            }])
        }
    }

    #[test]
    fn test_dark_frame_skips_analysis() {
        let mut analyzer = CountingAnalyzer { calls: 0 };
        let frame = Frame::from_rgb(vec![0u8; 4 * 4 * 3], 4, 4, 1);
        assert!(frame.is_dark);

        let detections = analyze_frame(&mut analyzer, &frame).unwrap();
        assert!(detections.is_empty());
        assert_eq!(analyzer.calls, 0);
    }

    #[test]
    fn test_lit_frame_is_analyzed() {
        let mut analyzer = CountingAnalyzer { calls: 0 };
        let frame = Frame::from_rgb(vec![200u8; 4 * 4 * 3], 4, 4, 2);

        let detections = analyze_frame(&mut analyzer, &frame).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(analyzer.calls, 1);
    }

    #[test]
    fn test_truncated_frame_is_error() {
        let mut analyzer = CountingAnalyzer { calls: 0 };
        let frame = Frame::from_rgb(vec![200u8; 10], 4, 4, 3);
        assert!(matches!(
            analyze_frame(&mut analyzer, &frame),
            Err(EngineError::BadFrame { width: 4, height: 4 })
        ));
    }

    #[test]
    fn test_sample_without_camera_is_error() {
        let mut worker = Worker {
            analyzer: CountingAnalyzer { calls: 0 },
            camera: None,
            device: "/dev/null-camera".into(),
            warmup_frames: 0,
        };
        assert!(matches!(worker.sample(), Err(EngineError::CameraClosed)));
    }

    #[test]
    fn test_permission_denied_classification() {
        let err = EngineError::Camera(CameraError::PermissionDenied("/dev/video0".into()));
        assert!(err.is_permission_denied());
        assert!(!EngineError::CameraClosed.is_permission_denied());
    }
}
