// Audio module - microphone level sampling, recording sessions and
// continuous capture

pub mod capture;
pub mod level;
pub mod recorder;
pub mod session;

// Re-export commonly used types for convenience
pub use capture::{AudioCaptureController, AudioUnit, CaptureChannels, CaptureState};
pub use level::{
    compute_rms, AudioLevelSample, LevelMonitor, LevelWindow, DEFAULT_LEVEL_WINDOW,
    INITIAL_MAX_AMPLITUDE,
};
pub use recorder::InputDeviceInfo;
pub use session::{RecordingSession, SessionState};
