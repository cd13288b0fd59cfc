#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use soundwatch::audio::AudioUnit;
use soundwatch::cache::ReferenceClass;
use soundwatch::engine::StubBackend;
use soundwatch::evaluation::EvaluationRecord;
use soundwatch::remote::{Classifier, EvaluationApi, HealthApi, HealthStatus, ReferenceApi};
use soundwatch::storage::KeyValueStore;
use soundwatch::{AppConfig, EngineDeps, EngineHandle, RemoteError};

/// Remote services backed by fixed responses, with optional latency.
pub struct ScriptedRemote {
    pub predictions: HashMap<String, f32>,
    pub classify_delay: Duration,
    pub classes: Mutex<Result<Vec<ReferenceClass>, RemoteError>>,
    pub classify_calls: AtomicUsize,
    pub submitted: Mutex<Vec<EvaluationRecord>>,
}

impl ScriptedRemote {
    pub fn new(predictions: &[(&str, f32)]) -> Self {
        Self {
            predictions: predictions
                .iter()
                .map(|(label, score)| (label.to_string(), *score))
                .collect(),
            classify_delay: Duration::ZERO,
            classes: Mutex::new(Ok(Vec::new())),
            classify_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_classify_delay(mut self, delay: Duration) -> Self {
        self.classify_delay = delay;
        self
    }

    pub fn set_classes(&self, classes: Result<Vec<ReferenceClass>, RemoteError>) {
        *self.classes.lock().unwrap() = classes;
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedRemote {
    async fn classify(&self, _unit: &AudioUnit) -> Result<HashMap<String, f32>, RemoteError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        if !self.classify_delay.is_zero() {
            tokio::time::sleep(self.classify_delay).await;
        }
        Ok(self.predictions.clone())
    }
}

#[async_trait]
impl EvaluationApi for ScriptedRemote {
    async fn submit(&self, record: &EvaluationRecord) -> Result<(), RemoteError> {
        self.submitted.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl ReferenceApi for ScriptedRemote {
    async fn fetch_classes(&self) -> Result<Vec<ReferenceClass>, RemoteError> {
        self.classes.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthApi for ScriptedRemote {
    async fn health(&self) -> Result<HealthStatus, RemoteError> {
        Ok(HealthStatus {
            status: "ok".to_string(),
            model_loaded: Some(true),
        })
    }
}

pub fn reference_class(id: i64, name: &str) -> ReferenceClass {
    ReferenceClass {
        id,
        name: name.to_string(),
        description: None,
        min_confidence: 0.5,
        is_active: true,
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

/// Config rooted in `dir` with one-second sessions.
pub fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.detection.recording_duration_seconds = 1;
    config.capture.recordings_dir = Some(dir.join("recordings"));
    config.storage.data_dir = Some(dir.to_path_buf());
    config
}

pub fn build_engine(
    config: AppConfig,
    backend: Arc<StubBackend>,
    remote: Arc<ScriptedRemote>,
    store: Arc<dyn KeyValueStore>,
) -> EngineHandle {
    EngineHandle::with_dependencies(
        config,
        EngineDeps {
            backend,
            classifier: remote.clone(),
            evaluation_api: remote.clone(),
            reference_api: remote.clone(),
            health_api: remote,
            store,
        },
    )
}

pub fn wav_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map(|ext| ext == "wav").unwrap_or(false))
            .collect(),
        Err(_) => Vec::new(),
    }
}
