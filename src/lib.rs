// Soundwatch Core - continuous sound-event detection pipeline
// Fixed-length microphone capture, remote classification and result caching

// Module declarations
pub mod audio;
pub mod cache;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod managers;
pub mod remote;
pub mod storage;
pub mod telemetry;

// Re-exports for convenience
pub use config::{AppConfig, DetectionConfig};
pub use detection::ClassificationDecision;
pub use engine::{EngineDeps, EngineHandle};
pub use error::{CaptureError, ErrorCode, RemoteError, StorageError};
