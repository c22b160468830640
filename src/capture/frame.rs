use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Pixel layout of a camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit grayscale, 1 byte per pixel
    Gray8,
    /// Packed 8-bit RGB, 3 bytes per pixel
    Rgb8,
    /// Packed 8-bit RGBA, 4 bytes per pixel
    Rgba8,
    /// YUV 4:2:0, luma plane first followed by the chroma planes
    Yuv420,
}

impl PixelFormat {
    /// Byte length of a `width x height` frame in this format
    ///
    /// Returns `None` if the length does not fit in `usize`.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let w = width as usize;
        let h = height as usize;
        let pixels = w.checked_mul(h)?;
        match self {
            PixelFormat::Gray8 => Some(pixels),
            PixelFormat::Rgb8 => pixels.checked_mul(3),
            PixelFormat::Rgba8 => pixels.checked_mul(4),
            PixelFormat::Yuv420 => {
                let chroma = w.div_ceil(2).checked_mul(h.div_ceil(2))?;
                pixels.checked_add(chroma.checked_mul(2)?)
            }
        }
    }

    /// Bytes between horizontally adjacent pixels of the plane that is read
    pub(crate) fn stride(self) -> usize {
        match self {
            PixelFormat::Gray8 | PixelFormat::Yuv420 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    pub(crate) fn is_rgb(self) -> bool {
        matches!(self, PixelFormat::Rgb8 | PixelFormat::Rgba8)
    }
}

/// A borrowed camera frame; only valid for the duration of one ingest call
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Capture time on a monotonic clock, if the camera provides one
    pub timestamp: Option<Duration>,
}

impl<'a> Frame<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Check dimensions and buffer length against the pixel format
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::ZeroDimensions {
                width: self.width,
                height: self.height,
            });
        }

        let expected = self
            .format
            .frame_len(self.width, self.height)
            .ok_or(FrameError::LengthMismatch {
                expected: usize::MAX,
                actual: self.data.len(),
            })?;

        if self.data.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: self.data.len(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len_per_format() {
        assert_eq!(PixelFormat::Gray8.frame_len(640, 480), Some(307_200));
        assert_eq!(PixelFormat::Rgb8.frame_len(640, 480), Some(921_600));
        assert_eq!(PixelFormat::Rgba8.frame_len(640, 480), Some(1_228_800));
        assert_eq!(PixelFormat::Yuv420.frame_len(640, 480), Some(460_800));
        // Odd dimensions round the chroma planes up
        assert_eq!(PixelFormat::Yuv420.frame_len(3, 3), Some(9 + 2 * 4));
    }

    #[test]
    fn test_validate_accepts_exact_length() {
        let data = vec![0u8; 12];
        assert!(Frame::new(&data, 2, 2, PixelFormat::Rgb8).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_dimensions() {
        let data: Vec<u8> = Vec::new();
        assert_eq!(
            Frame::new(&data, 0, 4, PixelFormat::Gray8).validate(),
            Err(FrameError::ZeroDimensions {
                width: 0,
                height: 4
            })
        );
    }

    #[test]
    fn test_validate_rejects_short_buffer() {
        let data = vec![0u8; 10];
        assert_eq!(
            Frame::new(&data, 4, 4, PixelFormat::Gray8).validate(),
            Err(FrameError::LengthMismatch {
                expected: 16,
                actual: 10
            })
        );
    }

    #[test]
    fn test_timestamp_builder() {
        let data = vec![0u8; 4];
        let frame =
            Frame::new(&data, 2, 2, PixelFormat::Gray8).with_timestamp(Duration::from_millis(33));
        assert_eq!(frame.timestamp, Some(Duration::from_millis(33)));
    }
}
