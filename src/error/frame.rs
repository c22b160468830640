// Frame error types and constants

use crate::error::ErrorCode;
use log::debug;
use std::fmt;

/// Frame error code constants shared with the Android layer
///
/// Error code range: 1001-1005
pub struct FrameErrorCodes {}

impl FrameErrorCodes {
    /// Frame has a zero width or height
    pub const ZERO_DIMENSIONS: i32 = 1001;

    /// Frame dimensions differ from the configured capture resolution
    pub const DIMENSION_MISMATCH: i32 = 1002;

    /// Pixel buffer length does not match width x height x channels
    pub const LENGTH_MISMATCH: i32 = 1003;

    /// Region of interest collapses to an empty pixel rectangle
    pub const INVALID_REGION: i32 = 1004;

    /// Frame arrived while no session was running
    pub const NOT_RUNNING: i32 = 1005;
}

/// Log a rejected frame with structured context
///
/// Invalid frames are expected at the camera boundary (rebinds, format
/// changes), so they are logged at debug level only.
pub fn log_frame_error(err: &FrameError, context: &str) {
    debug!(
        "Frame rejected in {}: code={}, component=FrameIngestor, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Malformed-frame errors
///
/// Frames failing validation are dropped; none of these abort the session.
///
/// Error code range: 1001-1005
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Width or height is zero
    ZeroDimensions { width: u32, height: u32 },

    /// Dimensions differ from the fixed capture resolution
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Pixel buffer length does not match the pixel format
    LengthMismatch { expected: usize, actual: usize },

    /// Region of interest is empty for this frame size
    InvalidRegion { width: u32, height: u32 },

    /// No session is accepting frames
    NotRunning,
}

impl ErrorCode for FrameError {
    fn code(&self) -> i32 {
        match self {
            FrameError::ZeroDimensions { .. } => FrameErrorCodes::ZERO_DIMENSIONS,
            FrameError::DimensionMismatch { .. } => FrameErrorCodes::DIMENSION_MISMATCH,
            FrameError::LengthMismatch { .. } => FrameErrorCodes::LENGTH_MISMATCH,
            FrameError::InvalidRegion { .. } => FrameErrorCodes::INVALID_REGION,
            FrameError::NotRunning => FrameErrorCodes::NOT_RUNNING,
        }
    }

    fn message(&self) -> String {
        match self {
            FrameError::ZeroDimensions { width, height } => {
                format!("Frame dimensions must be non-zero (got {}x{})", width, height)
            }
            FrameError::DimensionMismatch { expected, actual } => format!(
                "Frame is {}x{}, capture resolution is {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            FrameError::LengthMismatch { expected, actual } => {
                format!(
                    "Pixel buffer has {} bytes, expected {}",
                    actual, expected
                )
            }
            FrameError::InvalidRegion { width, height } => {
                format!("Region of interest is empty for a {}x{} frame", width, height)
            }
            FrameError::NotRunning => {
                "Monitor not running. Call start() before ingesting frames.".to_string()
            }
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for FrameError {}
