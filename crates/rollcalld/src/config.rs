use rollcall_core::MatchMetric;
use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::DeliveryPolicy;

/// Which D-Bus the control interface is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Base directory for the roster and reference images.
    pub data_dir: PathBuf,
    /// Roster TOML; the embedded default roster is used when absent.
    pub roster_path: PathBuf,
    pub match_metric: MatchMetric,
    /// Distance (euclidean) or similarity (cosine) cutoff.
    pub match_threshold: f32,
    pub sample_interval: Duration,
    /// Upper bound on one detection pass.
    pub sample_timeout: Duration,
    /// Number of warmup frames to discard after the camera opens.
    pub warmup_frames: usize,
    pub snapshot_quality: u8,
    pub backend_url: String,
    pub backend_timeout: Duration,
    pub delivery: DeliveryPolicy,
    pub mark_absent_on_stop: bool,
    /// Start a session as soon as the gallery is loaded.
    pub autostart: bool,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(rollcall_core::default_data_dir);
        let model_dir = lookup("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("models"));
        let roster_path = lookup("ROLLCALL_ROSTER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("roster.toml"));

        let match_metric = lookup("ROLLCALL_MATCH_METRIC")
            .and_then(|v| match v.parse() {
                Ok(m) => Some(m),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring ROLLCALL_MATCH_METRIC");
                    None
                }
            })
            .unwrap_or(MatchMetric::Euclidean);

        let attempts: u32 = parse_or(&lookup, "ROLLCALL_DELIVERY_ATTEMPTS", 1);
        let delivery = if attempts > 1 {
            DeliveryPolicy::Retry {
                max_attempts: attempts,
                base_delay: Duration::from_millis(parse_or(&lookup, "ROLLCALL_DELIVERY_BACKOFF_MS", 500)),
            }
        } else {
            DeliveryPolicy::BestEffort
        };

        let bus = match lookup("ROLLCALL_BUS").as_deref() {
            Some("system") => BusKind::System,
            _ => BusKind::Session,
        };

        Self {
            camera_device: lookup("ROLLCALL_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir,
            roster_path,
            match_metric,
            match_threshold: parse_or(&lookup, "ROLLCALL_MATCH_THRESHOLD", 0.7),
            sample_interval: Duration::from_millis(parse_or::<u64>(&lookup, "ROLLCALL_SAMPLE_INTERVAL_MS", 1000).max(1)),
            sample_timeout: Duration::from_millis(parse_or(&lookup, "ROLLCALL_SAMPLE_TIMEOUT_MS", 5000)),
            warmup_frames: parse_or(&lookup, "ROLLCALL_WARMUP_FRAMES", 4),
            snapshot_quality: parse_or(&lookup, "ROLLCALL_SNAPSHOT_QUALITY", 80),
            backend_url: lookup("ROLLCALL_BACKEND_URL").unwrap_or_else(|| "http://127.0.0.1:5000".to_string()),
            backend_timeout: Duration::from_secs(parse_or(&lookup, "ROLLCALL_BACKEND_TIMEOUT_SECS", 10)),
            delivery,
            mark_absent_on_stop: flag(&lookup, "ROLLCALL_MARK_ABSENT_ON_STOP", false),
            autostart: flag(&lookup, "ROLLCALL_AUTOSTART", true),
            bus,
            data_dir,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => false,
        "1" | "true" | "yes" | "on" => true,
        _ => {
            tracing::warn!(key, value = %raw, default, "unrecognised boolean, using default");
            default
        }
    }
}
