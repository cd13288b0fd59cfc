// Remote service error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Remote error code constants
///
/// Error code range: 2001-2006
pub struct RemoteErrorCodes {}

impl RemoteErrorCodes {
    /// Remote call exceeded its deadline
    pub const TIMEOUT: i32 = 2001;

    /// Connection, DNS or TLS failure
    pub const TRANSPORT: i32 = 2002;

    /// Server answered with a non-success HTTP status
    pub const HTTP_STATUS: i32 = 2003;

    /// Response body did not have the expected shape
    pub const MALFORMED_RESPONSE: i32 = 2004;

    /// Server accepted the request but reported a failure status
    pub const REJECTED: i32 = 2005;

    /// Audio unit could not be read for upload
    pub const AUDIO_READ: i32 = 2006;
}

/// Log a remote error with structured context
pub fn log_remote_error(err: &RemoteError, context: &str) {
    error!(
        "Remote error in {}: code={}, component=RemoteService, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Failures talking to the classifier, evaluation, reference or health
/// services.
///
/// Every variant is recovered locally by the caller; none of them stops the
/// capture pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// Remote call exceeded its deadline
    Timeout { operation: String, after_ms: u64 },

    /// Connection, DNS or TLS failure
    Transport { reason: String },

    /// Non-2xx HTTP status (503 while the server model is loading)
    HttpStatus { status: u16 },

    /// Unexpected payload shape
    MalformedResponse { reason: String },

    /// Server reported a non-success status in the body
    Rejected { status: String },

    /// Audio unit could not be read before upload
    AudioRead { reason: String },
}

impl RemoteError {
    pub fn timeout(operation: &str, after: std::time::Duration) -> Self {
        RemoteError::Timeout {
            operation: operation.to_string(),
            after_ms: after.as_millis() as u64,
        }
    }
}

impl ErrorCode for RemoteError {
    fn code(&self) -> i32 {
        match self {
            RemoteError::Timeout { .. } => RemoteErrorCodes::TIMEOUT,
            RemoteError::Transport { .. } => RemoteErrorCodes::TRANSPORT,
            RemoteError::HttpStatus { .. } => RemoteErrorCodes::HTTP_STATUS,
            RemoteError::MalformedResponse { .. } => RemoteErrorCodes::MALFORMED_RESPONSE,
            RemoteError::Rejected { .. } => RemoteErrorCodes::REJECTED,
            RemoteError::AudioRead { .. } => RemoteErrorCodes::AUDIO_READ,
        }
    }

    fn message(&self) -> String {
        match self {
            RemoteError::Timeout {
                operation,
                after_ms,
            } => format!("{} timed out after {} ms", operation, after_ms),
            RemoteError::Transport { reason } => format!("Network error: {}", reason),
            RemoteError::HttpStatus { status } => {
                if *status == 503 {
                    "Server unavailable (HTTP 503): classifier is still loading".to_string()
                } else {
                    format!("Server returned HTTP {}", status)
                }
            }
            RemoteError::MalformedResponse { reason } => {
                format!("Unexpected response from server: {}", reason)
            }
            RemoteError::Rejected { status } => {
                format!("Server rejected the request (status: {})", status)
            }
            RemoteError::AudioRead { reason } => {
                format!("Could not read audio unit: {}", reason)
            }
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RemoteError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::MalformedResponse {
                reason: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            RemoteError::HttpStatus {
                status: status.as_u16(),
            }
        } else {
            RemoteError::Transport {
                reason: err.to_string(),
            }
        }
    }
}
