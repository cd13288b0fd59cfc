//! Capture backend abstractions for the engine core.

use std::path::{Path, PathBuf};

use crate::error::CaptureError;

/// Trait implemented by microphone capture backends.
///
/// A backend records one file at a time. The capture controller drives it
/// through `start` and `stop` once per session and polls `amplitude` on every
/// level tick.
pub trait CaptureBackend: Send + Sync {
    /// Begin recording into `path`. Fails with `AlreadyActive` if a recording
    /// is in progress.
    fn start(&self, path: &Path) -> Result<(), CaptureError>;

    /// Peak raw amplitude since the previous call, in [0, 1].
    fn amplitude(&self) -> f32;

    /// Finish the current recording and return the written file.
    fn stop(&self) -> Result<PathBuf, CaptureError>;

    /// Abandon the current recording, if any, and delete its file.
    fn discard(&self);
}

mod cpal;
pub use self::cpal::CpalBackend;

mod stub;
pub use stub::StubBackend;
