// AudioCaptureController - continuous back-to-back recording sessions
//
// Idle -> Active -> Finalizing -> Idle, looping until stopped. One cycle task
// owns the active session, the level and countdown timers and the gap sleep;
// cancelling its token tears all of them down at once.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::level::{AudioLevelSample, LevelMonitor};
use super::session::RecordingSession;
use crate::config::{CaptureConfig, DetectionConfig};
use crate::engine::backend::CaptureBackend;
use crate::error::{log_capture_error, CaptureError};
use crate::telemetry::{PipelineEvent, TelemetryCollector};

/// Observable controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Active,
    Finalizing,
    Stopped,
}

/// A finalized recording that passed silence gating.
///
/// The file at `path` is a temporary artifact; whoever consumes the unit is
/// responsible for deleting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioUnit {
    pub id: String,
    pub path: PathBuf,
    pub rms: f32,
    pub captured_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Publish side of the channels the controller writes to.
#[derive(Clone)]
pub struct CaptureChannels {
    pub levels: broadcast::Sender<AudioLevelSample>,
    pub countdown: broadcast::Sender<u32>,
    pub units: broadcast::Sender<AudioUnit>,
}

struct CaptureWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct CaptureShared {
    backend: Arc<dyn CaptureBackend>,
    settings: Arc<RwLock<DetectionConfig>>,
    capture: CaptureConfig,
    recordings_dir: PathBuf,
    monitor: Mutex<LevelMonitor>,
    countdown_tx: broadcast::Sender<u32>,
    unit_tx: broadcast::Sender<AudioUnit>,
    state_tx: watch::Sender<CaptureState>,
    telemetry: Arc<TelemetryCollector>,
}

/// Drives continuous capture and emits audio units.
///
/// Sole owner of the capture backend: nothing else starts, stops or polls the
/// microphone.
pub struct AudioCaptureController {
    shared: Arc<CaptureShared>,
    below_threshold_rx: watch::Receiver<bool>,
    worker: Mutex<Option<CaptureWorker>>,
}

impl AudioCaptureController {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        settings: Arc<RwLock<DetectionConfig>>,
        capture: CaptureConfig,
        recordings_dir: PathBuf,
        channels: CaptureChannels,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        let (below_tx, below_threshold_rx) = watch::channel(true);
        let (state_tx, _) = watch::channel(CaptureState::Idle);
        let monitor = LevelMonitor::new(channels.levels, below_tx);

        Self {
            shared: Arc::new(CaptureShared {
                backend,
                settings,
                capture,
                recordings_dir,
                monitor: Mutex::new(monitor),
                countdown_tx: channels.countdown,
                unit_tx: channels.units,
                state_tx,
                telemetry,
            }),
            below_threshold_rx,
            worker: Mutex::new(None),
        }
    }

    fn lock_worker(&self) -> Result<MutexGuard<'_, Option<CaptureWorker>>, CaptureError> {
        self.worker.lock().map_err(|_| CaptureError::LockPoisoned {
            component: "capture_worker".to_string(),
        })
    }

    pub fn state(&self) -> CaptureState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CaptureState> {
        self.shared.state_tx.subscribe()
    }

    /// Advisory flag: latest normalized level is below the microphone threshold.
    pub fn subscribe_below_threshold(&self) -> watch::Receiver<bool> {
        self.below_threshold_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .map(|guard| {
                guard
                    .as_ref()
                    .map(|worker| !worker.handle.is_finished())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Start the first session immediately and keep cycling until stopped.
    ///
    /// Must be called from within a tokio runtime. The first backend start
    /// runs on the calling thread and can block until the input stream opens
    /// (bounded by the recorder's 3 s readiness timeout); later sessions are
    /// started on the blocking pool.
    pub fn start_continuous(&self) -> Result<(), CaptureError> {
        let mut worker = self.lock_worker()?;
        if let Some(existing) = worker.as_ref() {
            if !existing.handle.is_finished() {
                return Err(CaptureError::AlreadyActive);
            }
        }

        let session = self.shared.begin_session().map_err(|cause| {
            let err = CaptureError::RecordingUnavailable {
                cause: Box::new(cause),
            };
            log_capture_error(&err, "start_continuous");
            self.shared.telemetry.record_capture_failure(&err);
            err
        })?;

        log::info!("[Capture] Continuous capture started");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_cycle(
            Arc::clone(&self.shared),
            session,
            cancel.clone(),
        ));
        *worker = Some(CaptureWorker { cancel, handle });
        Ok(())
    }

    /// Cancel every pending timer and discard any session in progress.
    ///
    /// Idempotent; safe to call when capture never started.
    pub async fn stop_continuous(&self) {
        let worker = match self.lock_worker() {
            Ok(mut guard) => guard.take(),
            Err(err) => {
                log_capture_error(&err, "stop_continuous");
                None
            }
        };

        // Never started (or failed to start): state stays as it is.
        let Some(worker) = worker else {
            return;
        };

        worker.cancel.cancel();
        if let Err(err) = worker.handle.await {
            log::warn!("[Capture] Cycle task ended abnormally: {}", err);
        }
        self.shared.backend.discard();
        self.shared.set_state(CaptureState::Stopped);
        log::info!("[Capture] Continuous capture stopped");
    }
}

impl Drop for AudioCaptureController {
    fn drop(&mut self) {
        if let Ok(guard) = self.worker.lock() {
            if let Some(worker) = guard.as_ref() {
                worker.cancel.cancel();
            }
        }
    }
}

impl CaptureShared {
    fn set_state(&self, state: CaptureState) {
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    fn settings(&self) -> DetectionConfig {
        self.settings
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Create a session and start the backend recording into it.
    fn begin_session(&self) -> Result<RecordingSession, CaptureError> {
        std::fs::create_dir_all(&self.recordings_dir)?;

        let settings = self.settings();
        let id = format!(
            "recording_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let path = self.recordings_dir.join(format!("{}.wav", id));
        let mut session = RecordingSession::new(
            id,
            path,
            settings.recording_duration_seconds,
            self.capture.level_window,
        );

        self.backend.start(session.path())?;
        session.activate()?;
        self.set_state(CaptureState::Active);
        self.telemetry.publish(PipelineEvent::SessionStarted {
            recording_id: session.id().to_string(),
        });
        log::debug!("[Capture] Session {} active", session.id());
        Ok(session)
    }

    fn observe_level(&self, threshold: f32) -> Option<AudioLevelSample> {
        let raw = self.backend.amplitude();
        match self.monitor.lock() {
            Ok(mut monitor) => Some(monitor.observe(raw, threshold)),
            Err(_) => {
                log_capture_error(
                    &CaptureError::LockPoisoned {
                        component: "level_monitor".to_string(),
                    },
                    "observe_level",
                );
                None
            }
        }
    }

    /// Run the countdown and level sampling. Returns false when cancelled.
    async fn run_active(
        &self,
        session: &mut RecordingSession,
        threshold: f32,
        cancel: &CancellationToken,
    ) -> bool {
        let mut level_ticks = interval(self.capture.level_tick());
        level_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let countdown_period = self.capture.countdown_tick();
        let mut countdown_ticks = interval_at(Instant::now() + countdown_period, countdown_period);

        let _ = self.countdown_tx.send(session.remaining_secs());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = countdown_ticks.tick() => {
                    let remaining = session.tick();
                    let _ = self.countdown_tx.send(remaining);
                    if session.is_expired() {
                        return true;
                    }
                }
                _ = level_ticks.tick() => {
                    if let Some(sample) = self.observe_level(threshold) {
                        session.record_level(sample);
                    }
                }
            }
        }
    }

    /// Stop the backend, gate on RMS and emit the unit if it qualifies.
    fn finalize(&self, mut session: RecordingSession, threshold: f32, cancel: &CancellationToken) {
        self.set_state(CaptureState::Finalizing);
        let rms = match session.begin_finalize() {
            Ok(rms) => rms,
            Err(err) => {
                log_capture_error(&err, "finalize");
                self.backend.discard();
                return;
            }
        };

        let path = match self.backend.stop() {
            Ok(path) => path,
            Err(err) => {
                log_capture_error(&err, "finalize");
                self.telemetry.record_capture_failure(&err);
                return;
            }
        };

        if cancel.is_cancelled() {
            remove_unit_file(&path);
            return;
        }

        if session.is_silent(threshold) {
            log::debug!(
                "[Capture] Session {} rejected as silence (rms={:.3} < {:.3})",
                session.id(),
                rms,
                threshold
            );
            remove_unit_file(&path);
            self.telemetry.publish(PipelineEvent::SilenceRejected {
                recording_id: session.id().to_string(),
                rms,
                threshold,
            });
            return;
        }

        let unit = AudioUnit {
            id: session.id().to_string(),
            path,
            rms,
            captured_at: session.started_at().unwrap_or_else(Utc::now),
            duration: session.duration(),
        };
        self.telemetry.publish(PipelineEvent::UnitEmitted {
            recording_id: unit.id.clone(),
            rms,
        });
        log::debug!("[Capture] Emitting unit {} (rms={:.3})", unit.id, rms);

        if let Err(broadcast::error::SendError(unit)) = self.unit_tx.send(unit) {
            log::debug!("[Capture] No unit subscribers; deleting {}", unit.id);
            remove_unit_file(&unit.path);
        }
    }
}

/// Delete leftover `recording_*.wav` files in `dir`, returning how many went.
///
/// Units skipped by a lagging consumer, or left behind by a crash, are never
/// seen by anyone who would delete them; a sweep at startup reclaims them.
pub(crate) fn sweep_stale_recordings(dir: &std::path::Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
        let is_unit = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("recording_") && name.ends_with(".wav"))
            .unwrap_or(false);
        if is_unit && std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        log::info!(
            "[Capture] Removed {} stale recordings from {}",
            removed,
            dir.display()
        );
    }
    removed
}

pub(crate) fn remove_unit_file(path: &std::path::Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::warn!("[Capture] Could not delete {}: {}", path.display(), err);
        }
    }
}

async fn run_cycle(shared: Arc<CaptureShared>, first: RecordingSession, cancel: CancellationToken) {
    let mut session = first;
    loop {
        let threshold = shared.settings().microphone_threshold;
        if !shared.run_active(&mut session, threshold, &cancel).await {
            shared.backend.discard();
            break;
        }

        // Backend stop joins the writer thread; keep it off the runtime.
        let finalizing = Arc::clone(&shared);
        let finalize_cancel = cancel.clone();
        let finalized = tokio::task::spawn_blocking(move || {
            finalizing.finalize(session, threshold, &finalize_cancel)
        })
        .await;
        if let Err(err) = finalized {
            log::error!("[Capture] Finalize task failed: {}", err);
            shared.backend.discard();
            break;
        }
        if cancel.is_cancelled() {
            break;
        }

        shared.set_state(CaptureState::Idle);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.capture.session_gap()) => {}
        }

        let starting = Arc::clone(&shared);
        session = match tokio::task::spawn_blocking(move || starting.begin_session()).await {
            Ok(Ok(next)) => next,
            Ok(Err(err)) => {
                log_capture_error(&err, "next_session");
                shared.telemetry.record_capture_failure(&err);
                break;
            }
            Err(err) => {
                log::error!("[Capture] Session start task failed: {}", err);
                break;
            }
        };
    }
    shared.set_state(CaptureState::Stopped);
}
