// Error types for the breathing rate estimator
//
// This module defines custom error types for frame ingestion, rate estimation
// and session lifecycle, providing structured error handling with error codes
// suitable for FFI communication.

mod estimation;
mod frame;
mod session;

pub use estimation::{log_estimation_error, EstimationError, EstimationErrorCodes};
pub use frame::{log_frame_error, FrameError, FrameErrorCodes};
pub use session::{log_session_error, SessionError, SessionErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
