//! rollcall-hw: Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access producing RGB frames, plus the
//! still-image snapshot encoding sent with face-login notifications.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
