//! EngineHandle: owns and wires every pipeline component.
//!
//! Each component is constructed exactly once here and handed its
//! collaborators explicitly. The handle exposes lifecycle control, settings
//! updates and the subscription surface shared by the CLI and embedding code.

use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::capture::sweep_stale_recordings;
use crate::audio::{AudioCaptureController, CaptureState};
use crate::cache::{ReferenceDataCache, ResultCache};
use crate::config::{AppConfig, DetectionConfig};
use crate::detection::{ClassificationDecision, DetectionDispatcher};
use crate::engine::backend::{CaptureBackend, CpalBackend};
use crate::error::{log_storage_error, CaptureError, RemoteError, StorageError};
use crate::evaluation::{DeviceIdentifier, EvaluationChannel};
use crate::managers::BroadcastChannelManager;
use crate::remote::{Classifier, EvaluationApi, HealthApi, HealthStatus, HttpApiClient, ReferenceApi};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::telemetry::TelemetryCollector;

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

/// External collaborators the engine is built from.
#[derive(Clone)]
pub struct EngineDeps {
    pub backend: Arc<dyn CaptureBackend>,
    pub classifier: Arc<dyn Classifier>,
    pub evaluation_api: Arc<dyn EvaluationApi>,
    pub reference_api: Arc<dyn ReferenceApi>,
    pub health_api: Arc<dyn HealthApi>,
    pub store: Arc<dyn KeyValueStore>,
}

struct DispatchWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// EngineHandle orchestrates capture, detection, caching and evaluation.
pub struct EngineHandle {
    config: AppConfig,
    settings: Arc<RwLock<DetectionConfig>>,
    store: Arc<dyn KeyValueStore>,
    pub(crate) broadcasts: BroadcastChannelManager,
    telemetry: Arc<TelemetryCollector>,
    capture: AudioCaptureController,
    dispatcher: Arc<DetectionDispatcher>,
    results: Arc<ResultCache>,
    reference: Arc<ReferenceDataCache>,
    evaluation: EvaluationChannel,
    health_api: Arc<dyn HealthApi>,
    dispatch_worker: Mutex<Option<DispatchWorker>>,
}

impl EngineHandle {
    /// Build the production engine: durable file store (memory fallback),
    /// default microphone and the HTTP client.
    pub fn from_config(config: AppConfig) -> Self {
        let data_dir = config.storage.resolve_data_dir();
        let store: Arc<dyn KeyValueStore> = match FileStore::open(&data_dir) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                log_storage_error(&err, "open_data_dir");
                log::warn!("[Engine] Falling back to in-memory storage");
                Arc::new(MemoryStore::new())
            }
        };
        let client = Arc::new(HttpApiClient::new(&config.server));

        let deps = EngineDeps {
            backend: Arc::new(CpalBackend::new()),
            classifier: client.clone(),
            evaluation_api: client.clone(),
            reference_api: client.clone(),
            health_api: client,
            store,
        };
        Self::with_dependencies(config, deps)
    }

    pub fn with_dependencies(config: AppConfig, deps: EngineDeps) -> Self {
        let detection = match config.detection.load_persisted(deps.store.as_ref()) {
            Ok(detection) => detection,
            Err(err) => {
                log_storage_error(&err, "load_detection_settings");
                config.detection.clone()
            }
        };
        let settings = Arc::new(RwLock::new(detection));
        let broadcasts = BroadcastChannelManager::new();
        let telemetry = Arc::new(TelemetryCollector::default());

        let capture = AudioCaptureController::new(
            deps.backend,
            Arc::clone(&settings),
            config.capture.clone(),
            config.recordings_dir(),
            broadcasts.capture_channels(),
            Arc::clone(&telemetry),
        );

        let results = Arc::new(ResultCache::new(Arc::clone(&deps.store)));
        let dispatcher = Arc::new(DetectionDispatcher::new(
            deps.classifier,
            Arc::clone(&settings),
            Arc::clone(&results),
            broadcasts.decision_sender(),
            Arc::clone(&telemetry),
            config.server.classify_timeout(),
        ));

        let reference = Arc::new(ReferenceDataCache::new(
            deps.reference_api,
            Arc::clone(&deps.store),
            broadcasts.reference_classes_sender(),
            Arc::clone(&telemetry),
            config.server.reference_timeout(),
        ));

        let evaluation = EvaluationChannel::new(
            deps.evaluation_api,
            Arc::new(DeviceIdentifier::new(Arc::clone(&deps.store))),
            broadcasts.evaluation_status_sender(),
            Arc::clone(&telemetry),
            config.server.evaluation_timeout(),
        );

        Self {
            config,
            settings,
            store: deps.store,
            broadcasts,
            telemetry,
            capture,
            dispatcher,
            results,
            reference,
            evaluation,
            health_api: deps.health_api,
            dispatch_worker: Mutex::new(None),
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Load persisted history, start the dispatcher, the reference refresh
    /// loop and continuous capture.
    ///
    /// A running pipeline is left untouched and `AlreadyActive` is returned.
    /// If capture cannot start, the dispatcher and refresh loop started here
    /// are torn down again and the capture error is returned.
    pub async fn start(&self) -> Result<(), CaptureError> {
        if self.capture.is_running() {
            return Err(CaptureError::AlreadyActive);
        }

        if let Err(err) = self.results.load_persisted() {
            log_storage_error(&err, "load_recent_decisions");
        }
        if !self.dispatcher.is_busy() {
            sweep_stale_recordings(&self.config.recordings_dir());
        }

        self.start_dispatcher();
        self.reference
            .start_periodic_refresh(self.config.server.reference_refresh_interval());

        if let Err(err) = self.capture.start_continuous() {
            self.stop_workers().await;
            return Err(err);
        }
        log::info!("[Engine] Pipeline started");
        Ok(())
    }

    fn start_dispatcher(&self) {
        let mut worker = self
            .dispatch_worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if worker
            .as_ref()
            .map(|existing| !existing.handle.is_finished())
            .unwrap_or(false)
        {
            return;
        }

        let cancel = CancellationToken::new();
        let units = self.broadcasts.subscribe_units();
        let handle = tokio::spawn(Arc::clone(&self.dispatcher).run(units, cancel.clone()));
        *worker = Some(DispatchWorker { cancel, handle });
    }

    /// Stop capture, the dispatcher loop and the refresh timer. Idempotent.
    ///
    /// A classification already in flight is allowed to finish.
    pub async fn stop(&self) {
        self.capture.stop_continuous().await;
        self.stop_workers().await;
        log::info!("[Engine] Pipeline stopped");
    }

    async fn stop_workers(&self) {
        let worker = self
            .dispatch_worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(err) = worker.handle.await {
                log::warn!("[Engine] Dispatcher task ended abnormally: {}", err);
            }
        }

        self.reference.stop_periodic_refresh();
    }

    /// Stop everything and wait for the in-flight classification, if any.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.dispatcher.wait_idle().await;
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    pub fn detection_settings(&self) -> DetectionConfig {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply new detection settings and write them through.
    ///
    /// The in-memory update always takes effect; the returned error only
    /// reports that persisting failed. Capture picks up changes at the next
    /// session start, the dispatcher with the next unit.
    pub fn update_detection_settings(&self, settings: DetectionConfig) -> Result<(), StorageError> {
        let settings = settings.sanitized();
        match self.settings.write() {
            Ok(mut current) => *current = settings.clone(),
            Err(poisoned) => *poisoned.into_inner() = settings.clone(),
        }
        log::info!("[Engine] Detection settings updated: {:?}", settings);
        settings.persist(self.store.as_ref())
    }

    // ========================================================================
    // REMOTE OPERATIONS
    // ========================================================================

    pub async fn check_health(&self) -> Result<HealthStatus, RemoteError> {
        let timeout = self.config.server.health_timeout();
        tokio::time::timeout(timeout, self.health_api.health())
            .await
            .map_err(|_| RemoteError::timeout("health", timeout))?
    }

    pub async fn submit_evaluation(&self, decision: &ClassificationDecision, is_correct: bool) -> bool {
        self.evaluation.submit(decision, is_correct).await
    }

    /// Evaluate a cached decision by recording id; `None` if it is not cached.
    pub async fn evaluate_recording(&self, recording_id: &str, is_correct: bool) -> Option<bool> {
        let decision = self.results.find(recording_id)?;
        Some(self.evaluation.submit(&decision, is_correct).await)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    pub fn results(&self) -> &Arc<ResultCache> {
        &self.results
    }

    pub fn reference(&self) -> &Arc<ReferenceDataCache> {
        &self.reference
    }

    pub fn telemetry(&self) -> &Arc<TelemetryCollector> {
        &self.telemetry
    }

    pub fn device_id(&self) -> String {
        self.evaluation.device_id()
    }
}
