use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::CaptureError;

use super::CaptureBackend;

/// Deterministic backend used for testing and for running the pipeline
/// without a microphone.
///
/// Amplitude is whatever was last set; `stop` writes a short silent WAV file
/// so downstream consumers see a real file on disk.
pub struct StubBackend {
    amplitude_bits: AtomicU32,
    current: Mutex<Option<PathBuf>>,
    start_error: Mutex<Option<CaptureError>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    discards: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            amplitude_bits: AtomicU32::new(0.0_f32.to_bits()),
            current: Mutex::new(None),
            start_error: Mutex::new(None),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            discards: AtomicUsize::new(0),
        }
    }

    /// Raw amplitude reported from now on.
    pub fn set_amplitude(&self, amplitude: f32) {
        self.amplitude_bits
            .store(amplitude.to_bits(), Ordering::Relaxed);
    }

    /// Make every subsequent `start` fail with `err` (or succeed again with `None`).
    pub fn set_start_error(&self, err: Option<CaptureError>) {
        if let Ok(mut guard) = self.start_error.lock() {
            *guard = err;
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn discard_count(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.current
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn lock_current(&self) -> Result<std::sync::MutexGuard<'_, Option<PathBuf>>, CaptureError> {
        self.current.lock().map_err(|_| CaptureError::LockPoisoned {
            component: "stub_backend".to_string(),
        })
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn write_silence(path: &Path) -> Result<(), CaptureError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..800 {
        writer.write_sample(0_i16)?;
    }
    writer.finalize()?;
    Ok(())
}

impl CaptureBackend for StubBackend {
    fn start(&self, path: &Path) -> Result<(), CaptureError> {
        if let Some(err) = self
            .start_error
            .lock()
            .map_err(|_| CaptureError::LockPoisoned {
                component: "stub_backend".to_string(),
            })?
            .clone()
        {
            return Err(err);
        }

        let mut current = self.lock_current()?;
        if current.is_some() {
            return Err(CaptureError::AlreadyActive);
        }
        *current = Some(path.to_path_buf());
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn amplitude(&self) -> f32 {
        f32::from_bits(self.amplitude_bits.load(Ordering::Relaxed))
    }

    fn stop(&self) -> Result<PathBuf, CaptureError> {
        let path = self.lock_current()?.take().ok_or(CaptureError::NotActive)?;
        write_silence(&path)?;
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(path)
    }

    fn discard(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(path) = current.take() {
                let _ = std::fs::remove_file(&path);
                self.discards.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_lifecycle_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        let backend = StubBackend::new();

        backend.start(&path).unwrap();
        assert!(backend.is_recording());
        assert_eq!(backend.start(&path), Err(CaptureError::AlreadyActive));

        let written = backend.stop().unwrap();
        assert_eq!(written, path);
        assert!(path.exists());
        assert_eq!(backend.stop(), Err(CaptureError::NotActive));
        assert_eq!((backend.start_count(), backend.stop_count()), (1, 1));
    }

    #[test]
    fn test_forced_start_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::new();
        backend.set_start_error(Some(CaptureError::PermissionDenied));
        assert_eq!(
            backend.start(&dir.path().join("a.wav")),
            Err(CaptureError::PermissionDenied)
        );
        assert!(!backend.is_recording());

        backend.set_start_error(None);
        backend.start(&dir.path().join("a.wav")).unwrap();
    }

    #[test]
    fn test_amplitude_is_settable() {
        let backend = StubBackend::new();
        assert_eq!(backend.amplitude(), 0.0);
        backend.set_amplitude(0.42);
        assert_eq!(backend.amplitude(), 0.42);
    }

    #[test]
    fn test_discard_without_recording_is_noop() {
        let backend = StubBackend::new();
        backend.discard();
        assert_eq!(backend.discard_count(), 0);
    }
}
