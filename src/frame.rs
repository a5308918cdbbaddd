//! Decoded frame containers.
//!
//! - `RawFrame`: owned RGB24 pixels for one decoded frame. Bytes are private
//!   and zeroized on drop; footage never outlives the frame loop.
//! - `InferenceView`: borrowed, read-only view handed to detector backends,
//!   tagged with the frame index assigned by the session.

use anyhow::{anyhow, Result};
use image::RgbImage;
use zeroize::Zeroize;

use crate::detect::{DetectionResult, DetectorBackend};

/// One decoded RGB24 frame (`width * height * 3` bytes, row-major).
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RawFrame {
    /// Wrap decoded RGB24 pixels. Fails when the buffer length does not match.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Detector-facing view of this frame.
    pub fn inference_view(&self, frame_index: u64) -> InferenceView<'_> {
        InferenceView {
            frame: self,
            frame_index,
        }
    }

    /// Copy the pixels into an image buffer for drawing overlays.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

/// Read-only view of a frame for inference.
pub struct InferenceView<'a> {
    frame: &'a RawFrame,
    frame_index: u64,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    /// 1-based index of this frame within the analysis run.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// RGB24 pixels, valid for the duration of the borrow.
    pub fn pixels(&self) -> &'a [u8] {
        &self.frame.data
    }

    /// Run a detector backend on this frame.
    pub fn run_detector(&self, backend: &mut dyn DetectorBackend) -> Result<DetectionResult> {
        backend.detect(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(RawFrame::from_rgb(vec![0u8; 12], 2, 2).is_ok());
        assert!(RawFrame::from_rgb(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn inference_view_exposes_metadata() {
        let frame = RawFrame::from_rgb(vec![7u8; 4 * 3 * 3], 4, 3).unwrap();
        let view = frame.inference_view(42);

        assert_eq!(view.width(), 4);
        assert_eq!(view.height(), 3);
        assert_eq!(view.frame_index(), 42);
        assert_eq!(view.pixels().len(), frame.byte_len());
    }

    #[test]
    fn to_rgb_image_copies_pixels() {
        let frame = RawFrame::from_rgb(vec![9u8; 2 * 2 * 3], 2, 2).unwrap();
        let img = frame.to_rgb_image().unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 1).0, [9, 9, 9]);
    }
}
