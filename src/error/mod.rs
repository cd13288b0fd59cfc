// Error types for the soundwatch pipeline
//
// This module defines one error family per concern (capture hardware, remote
// services, durable storage). Every family carries a numeric code so callers
// can branch on failures without string matching.

mod capture;
mod remote;
mod storage;

pub use capture::{log_capture_error, CaptureError, CaptureErrorCodes};
pub use remote::{log_remote_error, RemoteError, RemoteErrorCodes};
pub use storage::{log_storage_error, StorageError, StorageErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the CLI and any embedding UI layer.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_trait_objects() {
        let capture: &dyn ErrorCode = &CaptureError::AlreadyActive;
        assert_eq!(capture.code(), CaptureErrorCodes::ALREADY_ACTIVE);

        let remote: &dyn ErrorCode = &RemoteError::Transport {
            reason: "reset".to_string(),
        };
        assert_eq!(remote.code(), RemoteErrorCodes::TRANSPORT);

        let storage: &dyn ErrorCode = &StorageError::Unavailable {
            reason: "read-only".to_string(),
        };
        assert_eq!(storage.code(), StorageErrorCodes::UNAVAILABLE);
    }

    #[test]
    fn test_code_ranges_do_not_overlap() {
        assert!(CaptureErrorCodes::ALREADY_ACTIVE < 2000);
        assert!((2000..3000).contains(&RemoteErrorCodes::TIMEOUT));
        assert!((3000..4000).contains(&StorageErrorCodes::IO));
    }
}
