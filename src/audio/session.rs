// RecordingSession - one fixed-length capture cycle
//
// Idle -> Active -> Finalizing. A session yields at most one audio unit; the
// controller discards it when the window RMS is below the microphone threshold.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::level::{AudioLevelSample, LevelWindow};
use crate::error::CaptureError;

/// Lifecycle of a single recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Active,
    Finalizing,
}

#[derive(Debug)]
pub struct RecordingSession {
    id: String,
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    duration: Duration,
    remaining_secs: u32,
    window: LevelWindow,
    path: PathBuf,
}

impl RecordingSession {
    /// New idle session that will record into `path`.
    pub fn new(id: String, path: PathBuf, duration_secs: u32, window_capacity: usize) -> Self {
        let duration_secs = duration_secs.max(1);
        Self {
            id,
            state: SessionState::Idle,
            started_at: None,
            duration: Duration::from_secs(u64::from(duration_secs)),
            remaining_secs: duration_secs,
            window: LevelWindow::new(window_capacity),
            path,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn window(&self) -> &LevelWindow {
        &self.window
    }

    /// Idle -> Active.
    pub fn activate(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Idle {
            return Err(CaptureError::AlreadyActive);
        }
        self.state = SessionState::Active;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Append a level sample while active; ignored in any other state.
    pub fn record_level(&mut self, sample: AudioLevelSample) {
        if self.state == SessionState::Active {
            self.window.push(sample);
        }
    }

    /// Decrement the countdown by one tick and return the remaining seconds.
    pub fn tick(&mut self) -> u32 {
        if self.state == SessionState::Active {
            self.remaining_secs = self.remaining_secs.saturating_sub(1);
        }
        self.remaining_secs
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_secs == 0
    }

    /// Active -> Finalizing. Returns the RMS over the collected window.
    pub fn begin_finalize(&mut self) -> Result<f32, CaptureError> {
        if self.state != SessionState::Active {
            return Err(CaptureError::NotActive);
        }
        self.state = SessionState::Finalizing;
        Ok(self.window.rms())
    }

    /// True when the window RMS is below `threshold`.
    pub fn is_silent(&self, threshold: f32) -> bool {
        self.window.rms() < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(duration: u32) -> RecordingSession {
        RecordingSession::new(
            "rec-1".to_string(),
            PathBuf::from("/tmp/rec-1.wav"),
            duration,
            30,
        )
    }

    fn sample(level: f32, sequence: u64) -> AudioLevelSample {
        AudioLevelSample { level, sequence }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut session = session(5);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.started_at().is_none());

        session.activate().unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.started_at().is_some());
        assert_eq!(session.activate(), Err(CaptureError::AlreadyActive));

        session.begin_finalize().unwrap();
        assert_eq!(session.state(), SessionState::Finalizing);
        assert_eq!(session.begin_finalize(), Err(CaptureError::NotActive));
    }

    #[test]
    fn test_countdown_reaches_zero() {
        let mut session = session(3);
        session.activate().unwrap();
        assert_eq!(session.tick(), 2);
        assert_eq!(session.tick(), 1);
        assert!(!session.is_expired());
        assert_eq!(session.tick(), 0);
        assert!(session.is_expired());
        assert_eq!(session.tick(), 0);
    }

    #[test]
    fn test_zero_duration_is_promoted_to_one_second() {
        let session = session(0);
        assert_eq!(session.remaining_secs(), 1);
        assert_eq!(session.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_levels_only_collected_while_active() {
        let mut session = session(5);
        session.record_level(sample(0.9, 0));
        assert!(session.window().is_empty());

        session.activate().unwrap();
        session.record_level(sample(0.5, 1));
        session.record_level(sample(0.5, 2));
        let rms = session.begin_finalize().unwrap();
        assert!((rms - 0.5).abs() < 1e-6);

        session.record_level(sample(0.9, 3));
        assert_eq!(session.window().len(), 2);
    }

    #[test]
    fn test_silence_gate() {
        let mut session = session(5);
        session.activate().unwrap();
        session.record_level(sample(0.05, 0));
        session.record_level(sample(0.05, 1));
        assert!(session.is_silent(0.1));
        assert!(!session.is_silent(0.01));
    }
}
