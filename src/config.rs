//! Configuration management for the detection pipeline
//!
//! This module provides runtime configuration loading from JSON files plus the
//! user-tunable detection settings, which are also persisted as primitive
//! values so they survive restarts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StorageError;
use crate::storage::{keys, KeyValueStore};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detection: DetectionConfig,
    pub capture: CaptureConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

/// User-facing detection settings (produced by the settings UI)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum top-class probability for a label to be reported as-is
    pub detection_threshold: f32,
    /// Minimum session RMS for a recording to be sent to the classifier
    pub microphone_threshold: f32,
    /// Downgrade below-threshold results to "unknown"
    pub filter_low_confidence: bool,
    /// Attach the full probability map to each decision
    pub show_all_predictions: bool,
    /// Length of each recording session
    pub recording_duration_seconds: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.2,
            microphone_threshold: 0.1,
            filter_low_confidence: true,
            show_all_predictions: false,
            recording_duration_seconds: 5,
        }
    }
}

impl DetectionConfig {
    /// Clamp thresholds into [0, 1] and force a recording of at least one second.
    pub fn sanitized(mut self) -> Self {
        self.detection_threshold = clamp_unit(self.detection_threshold, 0.2);
        self.microphone_threshold = clamp_unit(self.microphone_threshold, 0.1);
        self.recording_duration_seconds = self.recording_duration_seconds.max(1);
        self
    }

    /// Overlay persisted values on top of `self`.
    ///
    /// Missing keys keep the current value. Unparseable values are logged and
    /// ignored; a store that cannot be read at all is reported to the caller.
    pub fn load_persisted(&self, store: &dyn KeyValueStore) -> Result<Self, StorageError> {
        let mut config = self.clone();

        if let Some(value) = read_parsed::<f32>(store, keys::DETECTION_THRESHOLD)? {
            config.detection_threshold = value;
        }
        if let Some(value) = read_parsed::<f32>(store, keys::MICROPHONE_THRESHOLD)? {
            config.microphone_threshold = value;
        }
        if let Some(value) = read_parsed::<bool>(store, keys::FILTER_LOW_CONFIDENCE)? {
            config.filter_low_confidence = value;
        }
        if let Some(value) = read_parsed::<bool>(store, keys::SHOW_ALL_PREDICTIONS)? {
            config.show_all_predictions = value;
        }
        if let Some(value) = read_parsed::<u32>(store, keys::RECORDING_DURATION_SECONDS)? {
            config.recording_duration_seconds = value;
        }

        Ok(config.sanitized())
    }

    /// Write all five settings as primitive values.
    pub fn persist(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        store.put(
            keys::DETECTION_THRESHOLD,
            &self.detection_threshold.to_string(),
        )?;
        store.put(
            keys::MICROPHONE_THRESHOLD,
            &self.microphone_threshold.to_string(),
        )?;
        store.put(
            keys::FILTER_LOW_CONFIDENCE,
            &self.filter_low_confidence.to_string(),
        )?;
        store.put(
            keys::SHOW_ALL_PREDICTIONS,
            &self.show_all_predictions.to_string(),
        )?;
        store.put(
            keys::RECORDING_DURATION_SECONDS,
            &self.recording_duration_seconds.to_string(),
        )?;
        Ok(())
    }

    pub fn recording_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.recording_duration_seconds.max(1)))
    }
}

fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn read_parsed<T: std::str::FromStr>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                log::warn!("[Config] Ignoring unparseable persisted value for {}: {:?}", key, raw);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Timing of the capture loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interval between microphone amplitude samples
    pub level_tick_ms: u64,
    /// Countdown tick while a session is active
    pub countdown_tick_ms: u64,
    /// Pause between the end of one session and the start of the next
    pub session_gap_ms: u64,
    /// Number of level samples kept for the RMS estimate
    pub level_window: usize,
    /// Where temporary audio units are written (defaults under the data dir)
    pub recordings_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            level_tick_ms: 100,
            countdown_tick_ms: 1000,
            session_gap_ms: 1000,
            level_window: 30,
            recordings_dir: None,
        }
    }
}

impl CaptureConfig {
    pub fn level_tick(&self) -> Duration {
        Duration::from_millis(self.level_tick_ms.max(1))
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms.max(1))
    }

    pub fn session_gap(&self) -> Duration {
        Duration::from_millis(self.session_gap_ms)
    }
}

/// Remote service endpoints and deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Bearer token for endpoints that require a signed-in user
    pub auth_token: Option<String>,
    pub classify_timeout_ms: u64,
    pub evaluation_timeout_ms: u64,
    pub reference_timeout_ms: u64,
    pub health_timeout_ms: u64,
    pub reference_refresh_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            auth_token: None,
            classify_timeout_ms: 10_000,
            evaluation_timeout_ms: 5_000,
            reference_timeout_ms: 5_000,
            health_timeout_ms: 5_000,
            reference_refresh_secs: 15 * 60,
        }
    }
}

impl ServerConfig {
    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    pub fn reference_timeout(&self) -> Duration {
        Duration::from_millis(self.reference_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn reference_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.reference_refresh_secs.max(1))
    }
}

/// Location of durable state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured directory, or the platform data directory.
    pub fn resolve_data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("soundwatch"),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(mut config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config.detection = config.detection.sanitized();
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Directory for temporary audio units.
    pub fn recordings_dir(&self) -> PathBuf {
        self.capture
            .recordings_dir
            .clone()
            .unwrap_or_else(|| self.storage.resolve_data_dir().join("recordings"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.detection.detection_threshold, 0.2);
        assert_eq!(config.detection.microphone_threshold, 0.1);
        assert!(config.detection.filter_low_confidence);
        assert!(!config.detection.show_all_predictions);
        assert_eq!(config.detection.recording_duration_seconds, 5);
        assert_eq!(config.capture.level_window, 30);
        assert_eq!(config.server.classify_timeout_ms, 10_000);
        assert_eq!(config.server.reference_refresh_secs, 900);
    }

    #[test]
    fn test_json_roundtrip_with_partial_file() {
        let json = r#"{ "detection": { "detection_threshold": 0.5 } }"#;
        let parsed: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.detection.detection_threshold, 0.5);
        assert_eq!(parsed.detection.microphone_threshold, 0.1);
        assert_eq!(parsed.capture.session_gap_ms, 1000);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/definitely/not/here/soundwatch.json");
        assert_eq!(config.detection, DetectionConfig::default());
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load_from_file(&path);
        assert_eq!(config.server.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_sanitized_clamps_values() {
        let config = DetectionConfig {
            detection_threshold: 1.7,
            microphone_threshold: f32::NAN,
            recording_duration_seconds: 0,
            ..DetectionConfig::default()
        }
        .sanitized();
        assert_eq!(config.detection_threshold, 1.0);
        assert_eq!(config.microphone_threshold, 0.1);
        assert_eq!(config.recording_duration_seconds, 1);
    }

    #[test]
    fn test_persisted_settings_roundtrip() {
        let store = MemoryStore::new();
        let custom = DetectionConfig {
            detection_threshold: 0.35,
            microphone_threshold: 0.05,
            filter_low_confidence: false,
            show_all_predictions: true,
            recording_duration_seconds: 8,
        };
        custom.persist(&store).unwrap();

        let loaded = DetectionConfig::default().load_persisted(&store).unwrap();
        assert_eq!(loaded, custom);
    }

    #[test]
    fn test_unparseable_persisted_value_is_ignored() {
        let store = MemoryStore::new();
        store.put(keys::DETECTION_THRESHOLD, "high").unwrap();
        store.put(keys::SHOW_ALL_PREDICTIONS, "true").unwrap();

        let loaded = DetectionConfig::default().load_persisted(&store).unwrap();
        assert_eq!(loaded.detection_threshold, 0.2);
        assert!(loaded.show_all_predictions);
    }
}
