//! Frame type and image processing: YUYV/MJPG conversion, dark detection, snapshots.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Wrap raw RGB bytes, flagging dark frames.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&data, 0.95);
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        }
    }

    /// Copy into an `image` buffer. `None` if the data is truncated.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Encode the frame as a `data:image/jpeg;base64,...` URL.
    pub fn snapshot_data_url(&self, quality: u8) -> Result<String, FrameError> {
        let image = self.to_rgb_image().ok_or(FrameError::InvalidLength {
            expected: (self.width * self.height * 3) as usize,
            actual: self.data.len(),
        })?;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
            .encode_image(&image)
            .map_err(|e| FrameError::Encode(e.to_string()))?;

        Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)))
    }
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push((y + 1.402 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344_136 * u - 0.714_136 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

/// Decode a motion-JPEG buffer into RGB.
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<RgbImage, FrameError> {
    image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
        .map(|img| img.to_rgb8())
        .map_err(|e| FrameError::Decode(e.to_string()))
}

/// Check if an RGB frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels have luma below 32.
pub fn is_dark_frame(rgb: &[u8], threshold_pct: f32) -> bool {
    let pixels = rgb.len() / 3;
    if pixels == 0 {
        return true;
    }
    let dark_count = rgb.chunks_exact(3).filter(|px| luma(px) < 32.0).count();
    (dark_count as f32 / pixels as f32) > threshold_pct
}

fn luma(px: &[u8]) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("snapshot encode failed: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_grey_maps_to_grey() {
        // 2x1 image: neutral chroma keeps R=G=B=Y
        let yuyv = vec![100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        let yuyv = vec![76, 85, 76, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb[0] > 240, "red channel {}", rgb[0]);
        assert!(rgb[1] < 20 && rgb[2] < 20, "green/blue {:?}", &rgb[1..3]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&vec![0u8; 300], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&vec![128u8; 300], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright -> not dark
        let mut rgb = vec![10u8; 940 * 3];
        rgb.extend(vec![128u8; 60 * 3]);
        assert!(!is_dark_frame(&rgb, 0.95));
    }

    #[test]
    fn test_snapshot_data_url() {
        let frame = Frame::from_rgb(vec![200u8; 8 * 8 * 3], 8, 8, 1);
        let url = frame.snapshot_data_url(80).unwrap();
        let payload = url.strip_prefix("data:image/jpeg;base64,").expect("data URL prefix");
        let jpeg = STANDARD.decode(payload).unwrap();
        // JPEG SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = mjpeg_to_rgb(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (8, 8));
    }

    #[test]
    fn test_snapshot_truncated_frame() {
        let frame = Frame::from_rgb(vec![0u8; 10], 8, 8, 1);
        assert!(matches!(
            frame.snapshot_data_url(80),
            Err(FrameError::InvalidLength { expected: 192, actual: 10 })
        ));
    }
}
