// Session lifecycle error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Session error code constants
///
/// Error code range: 3001-3005
pub struct SessionErrorCodes {}

impl SessionErrorCodes {
    /// Configuration rejected at start()
    pub const INVALID_CONFIG: i32 = 3001;

    /// Monitor is already running
    pub const ALREADY_RUNNING: i32 = 3002;

    /// Monitor is not running
    pub const NOT_RUNNING: i32 = 3003;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 3004;

    /// Worker thread could not be spawned
    pub const THREAD_SPAWN: i32 = 3005;
}

/// Log a session error with structured context
///
/// This function logs session errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_session_error(err: &SessionError, context: &str) {
    error!(
        "Session error in {}: code={}, component=BreathingMonitor, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Session lifecycle errors
///
/// Only `InvalidConfig` is a setup-time rejection; the others report misuse
/// of the lifecycle or platform failures.
///
/// Error code range: 3001-3005
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Configuration failed validation
    InvalidConfig { field: String, reason: String },

    /// start() called while a session is active
    AlreadyRunning,

    /// stop() called without an active session
    NotRunning,

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Worker thread could not be spawned
    ThreadSpawn { reason: String },
}

impl SessionError {
    pub(crate) fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        SessionError::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> i32 {
        match self {
            SessionError::InvalidConfig { .. } => SessionErrorCodes::INVALID_CONFIG,
            SessionError::AlreadyRunning => SessionErrorCodes::ALREADY_RUNNING,
            SessionError::NotRunning => SessionErrorCodes::NOT_RUNNING,
            SessionError::LockPoisoned { .. } => SessionErrorCodes::LOCK_POISONED,
            SessionError::ThreadSpawn { .. } => SessionErrorCodes::THREAD_SPAWN,
        }
    }

    fn message(&self) -> String {
        match self {
            SessionError::InvalidConfig { field, reason } => {
                format!("Invalid configuration for {}: {}", field, reason)
            }
            SessionError::AlreadyRunning => {
                "Monitor already running. Call stop() first.".to_string()
            }
            SessionError::NotRunning => "Monitor not running. Call start() first.".to_string(),
            SessionError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            SessionError::ThreadSpawn { reason } => {
                format!("Failed to spawn worker thread: {}", reason)
            }
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::ThreadSpawn {
            reason: err.to_string(),
        }
    }
}
