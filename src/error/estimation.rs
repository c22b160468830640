// Estimation error types and constants
//
// None of these reach the caller of `get_current_rate()`: the estimator maps
// them onto a `RateStatus` on the published estimate.

use crate::error::ErrorCode;
use log::debug;
use std::fmt;

/// Estimation error code constants
///
/// Error code range: 2001-2003
pub struct EstimationErrorCodes {}

impl EstimationErrorCodes {
    /// Not enough history to cover one plausible breath cycle
    pub const INSUFFICIENT_DATA: i32 = 2001;

    /// Degenerate or non-finite analysis input
    pub const NUMERIC_INSTABILITY: i32 = 2002;

    /// Trigger skipped because an estimation was already in flight
    pub const SKIPPED: i32 = 2003;
}

/// Log an estimation error with structured context
pub fn log_estimation_error(err: &EstimationError, context: &str) {
    debug!(
        "Estimation error in {}: code={}, component=RateEstimator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised inside the analysis path
///
/// Error code range: 2001-2003
#[derive(Debug, Clone, PartialEq)]
pub enum EstimationError {
    /// Fewer samples or less coverage than required
    InsufficientData {
        samples: usize,
        required_samples: usize,
        span_seconds: f64,
        required_seconds: f64,
    },

    /// Analysis input collapsed (flat signal, NaN after preprocessing)
    NumericInstability { reason: String },

    /// Another estimation was in flight
    Skipped,
}

impl ErrorCode for EstimationError {
    fn code(&self) -> i32 {
        match self {
            EstimationError::InsufficientData { .. } => EstimationErrorCodes::INSUFFICIENT_DATA,
            EstimationError::NumericInstability { .. } => {
                EstimationErrorCodes::NUMERIC_INSTABILITY
            }
            EstimationError::Skipped => EstimationErrorCodes::SKIPPED,
        }
    }

    fn message(&self) -> String {
        match self {
            EstimationError::InsufficientData {
                samples,
                required_samples,
                span_seconds,
                required_seconds,
            } => format!(
                "Insufficient data: {} samples over {:.2}s (need {} over {:.2}s)",
                samples, span_seconds, required_samples, required_seconds
            ),
            EstimationError::NumericInstability { reason } => {
                format!("Numeric instability: {}", reason)
            }
            EstimationError::Skipped => "Estimation already in flight".to_string(),
        }
    }
}

impl fmt::Display for EstimationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EstimationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for EstimationError {}
