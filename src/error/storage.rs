// Durable storage error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Storage error code constants
///
/// Error code range: 3001-3004
pub struct StorageErrorCodes {}

impl StorageErrorCodes {
    /// Filesystem read/write failed
    pub const IO: i32 = 3001;

    /// Stored value could not be encoded or decoded
    pub const SERIALIZATION: i32 = 3002;

    /// Durable storage is not available at all
    pub const UNAVAILABLE: i32 = 3003;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 3004;
}

/// Log a storage error with structured context
pub fn log_storage_error(err: &StorageError, context: &str) {
    error!(
        "Storage error in {}: code={}, component=Storage, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Durable read/write failures.
///
/// Never fatal: callers log the error and continue with in-memory state.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    Io { reason: String },
    Serialization { reason: String },
    Unavailable { reason: String },
    LockPoisoned { component: String },
}

impl ErrorCode for StorageError {
    fn code(&self) -> i32 {
        match self {
            StorageError::Io { .. } => StorageErrorCodes::IO,
            StorageError::Serialization { .. } => StorageErrorCodes::SERIALIZATION,
            StorageError::Unavailable { .. } => StorageErrorCodes::UNAVAILABLE,
            StorageError::LockPoisoned { .. } => StorageErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            StorageError::Io { reason } => format!("Storage I/O failed: {}", reason),
            StorageError::Serialization { reason } => {
                format!("Stored value could not be (de)serialized: {}", reason)
            }
            StorageError::Unavailable { reason } => {
                format!("Durable storage unavailable: {}", reason)
            }
            StorageError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StorageError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            reason: err.to_string(),
        }
    }
}
