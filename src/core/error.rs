//! Error types for the camera watcher
//!
//! Adapter-level failures surface as [`CameraError`] at the call site. Background
//! jobs never propagate them across threads; they turn them into log entries and
//! device state transitions instead.

use crate::core::config::ConfigError;
use thiserror::Error;

/// Main error type for the camera watcher
#[derive(Error, Debug)]
pub enum CameraError {
    /// The external tool wrote to stderr. Any stderr output counts, whatever the exit code.
    #[error("'{command}' failed: {detail}")]
    ExecutionError { command: String, detail: String },

    /// The external process could not be started
    #[error("Failed to start '{command}': {message}")]
    SpawnError { command: String, message: String },

    /// The external process ran past its deadline and was killed
    #[error("'{command}' timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    /// The invocation was cancelled through its token and the process killed
    #[error("'{command}' was cancelled")]
    Cancelled { command: String },

    /// No registered device matches the given port path
    #[error("No device at {0}")]
    DeviceNotFound(String),

    /// A transfer was requested without a destination path
    #[error("No destination path configured")]
    NoDestination,

    /// The system log follower could not be set up
    #[error("Failed to start system event listener: {0}")]
    ListenerError(String),

    /// General I/O error
    #[error("IO error: {0}")]
    IoError(String),

    /// Configuration could not be loaded or saved
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CameraError>;

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_message_carries_detail() {
        let err = CameraError::ExecutionError {
            command: "gphoto2 --auto-detect".to_string(),
            detail: "*** Error: No camera found. ***".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "'gphoto2 --auto-detect' failed: *** Error: No camera found. ***"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CameraError = io.into();
        assert!(matches!(err, CameraError::IoError(ref m) if m == "gone"));
    }
}
