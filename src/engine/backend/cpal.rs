//! CPAL-based capture backend for desktop platforms (Linux, macOS, Windows)
//!
//! A thin adapter from the engine's `CaptureBackend` trait onto `WavRecorder`,
//! which owns the stream thread and the WAV writer.

use std::path::{Path, PathBuf};

use crate::audio::recorder::{self, InputDeviceInfo, WavRecorder};
use crate::error::CaptureError;

use super::CaptureBackend;

/// Default-input-device backend that delegates to `WavRecorder`
pub struct CpalBackend {
    recorder: WavRecorder,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            recorder: WavRecorder::new(),
        }
    }

    /// Input devices visible to the default host.
    pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>, CaptureError> {
        recorder::list_input_devices()
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for CpalBackend {
    fn start(&self, path: &Path) -> Result<(), CaptureError> {
        self.recorder.start(path)
    }

    fn amplitude(&self) -> f32 {
        self.recorder.take_peak()
    }

    fn stop(&self) -> Result<PathBuf, CaptureError> {
        self.recorder.stop()
    }

    fn discard(&self) {
        self.recorder.discard()
    }
}
