// Capture error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Capture error code constants
///
/// Single source of truth for the numeric codes surfaced to the CLI and to
/// any UI layer embedding the pipeline.
///
/// Error code range: 1001-1009
pub struct CaptureErrorCodes {}

impl CaptureErrorCodes {
    /// Continuous capture is already running
    pub const ALREADY_ACTIVE: i32 = 1001;

    /// No recording is in progress
    pub const NOT_ACTIVE: i32 = 1002;

    /// Microphone permission denied
    pub const PERMISSION_DENIED: i32 = 1003;

    /// Input device missing or busy
    pub const DEVICE_UNAVAILABLE: i32 = 1004;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 1005;

    /// Continuous capture could not acquire the microphone
    pub const RECORDING_UNAVAILABLE: i32 = 1006;

    /// Audio file could not be written
    pub const WRITE_FAILED: i32 = 1007;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1008;

    /// Audio stream failed while recording
    pub const STREAM_FAILURE: i32 = 1009;
}

/// Log a capture error with structured context
///
/// Logs the numeric code, the component and the human-readable message so
/// failures can be correlated across sessions. Never panics.
pub fn log_capture_error(err: &CaptureError, context: &str) {
    error!(
        "Capture error in {}: code={}, component=AudioCapture, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Capture-related errors
///
/// These errors cover microphone acquisition, stream management and the
/// lifecycle of continuous capture.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Continuous capture is already running
    AlreadyActive,

    /// No recording is in progress
    NotActive,

    /// Microphone permission denied
    PermissionDenied,

    /// Input device missing or held by another process
    DeviceUnavailable,

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// `start_continuous` could not acquire the microphone
    RecordingUnavailable { cause: Box<CaptureError> },

    /// Audio file could not be created or finalized
    WriteFailed { reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Stream thread died or disconnected unexpectedly
    StreamFailure { reason: String },
}

impl CaptureError {
    /// True when the microphone itself could not be acquired.
    pub fn is_acquisition_failure(&self) -> bool {
        match self {
            CaptureError::PermissionDenied
            | CaptureError::DeviceUnavailable
            | CaptureError::StreamOpenFailed { .. } => true,
            CaptureError::RecordingUnavailable { .. } => true,
            _ => false,
        }
    }
}

impl ErrorCode for CaptureError {
    fn code(&self) -> i32 {
        match self {
            CaptureError::AlreadyActive => CaptureErrorCodes::ALREADY_ACTIVE,
            CaptureError::NotActive => CaptureErrorCodes::NOT_ACTIVE,
            CaptureError::PermissionDenied => CaptureErrorCodes::PERMISSION_DENIED,
            CaptureError::DeviceUnavailable => CaptureErrorCodes::DEVICE_UNAVAILABLE,
            CaptureError::StreamOpenFailed { .. } => CaptureErrorCodes::STREAM_OPEN_FAILED,
            CaptureError::RecordingUnavailable { .. } => CaptureErrorCodes::RECORDING_UNAVAILABLE,
            CaptureError::WriteFailed { .. } => CaptureErrorCodes::WRITE_FAILED,
            CaptureError::LockPoisoned { .. } => CaptureErrorCodes::LOCK_POISONED,
            CaptureError::StreamFailure { .. } => CaptureErrorCodes::STREAM_FAILURE,
        }
    }

    fn message(&self) -> String {
        match self {
            CaptureError::AlreadyActive => {
                "Continuous capture already running. Call stop_continuous() first.".to_string()
            }
            CaptureError::NotActive => "No recording in progress".to_string(),
            CaptureError::PermissionDenied => {
                "Microphone permission denied. Please grant microphone access.".to_string()
            }
            CaptureError::DeviceUnavailable => {
                "Microphone unavailable (missing or in use by another application)".to_string()
            }
            CaptureError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            CaptureError::RecordingUnavailable { cause } => {
                format!("Recording unavailable: {}", cause.message())
            }
            CaptureError::WriteFailed { reason } => {
                format!("Failed to write audio file: {}", reason)
            }
            CaptureError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            CaptureError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CaptureError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::WriteFailed {
            reason: err.to_string(),
        }
    }
}

impl From<hound::Error> for CaptureError {
    fn from(err: hound::Error) -> Self {
        CaptureError::WriteFailed {
            reason: err.to_string(),
        }
    }
}
