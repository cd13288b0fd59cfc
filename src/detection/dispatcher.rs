// DetectionDispatcher - single-flight classification of audio units
//
// Admission is a depth-0 queue: while one unit is being classified, any other
// unit is dropped and its file deleted. The in-flight flag is an AtomicBool
// released by an RAII guard, so a panicking or cancelled task cannot wedge it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::decision::ClassificationDecision;
use super::policy::ThresholdPolicy;
use crate::audio::capture::remove_unit_file;
use crate::audio::AudioUnit;
use crate::cache::ResultCache;
use crate::config::DetectionConfig;
use crate::error::{log_remote_error, log_storage_error, ErrorCode, RemoteError};
use crate::remote::Classifier;
use crate::telemetry::{PipelineEvent, TelemetryCollector};

/// Releases the in-flight flag when dropped and wakes `wait_idle` callers.
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

pub struct DetectionDispatcher {
    classifier: Arc<dyn Classifier>,
    settings: Arc<RwLock<DetectionConfig>>,
    results: Arc<ResultCache>,
    decision_tx: broadcast::Sender<ClassificationDecision>,
    telemetry: Arc<TelemetryCollector>,
    classify_timeout: Duration,
    in_flight: Arc<AtomicBool>,
    idle: Arc<Notify>,
}

impl DetectionDispatcher {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        settings: Arc<RwLock<DetectionConfig>>,
        results: Arc<ResultCache>,
        decision_tx: broadcast::Sender<ClassificationDecision>,
        telemetry: Arc<TelemetryCollector>,
        classify_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            settings,
            results,
            decision_tx,
            telemetry,
            classify_timeout,
            in_flight: Arc::new(AtomicBool::new(false)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the single in-flight slot, or `None` if it is taken.
    pub fn try_admit(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                flag: Arc::clone(&self.in_flight),
                idle: Arc::clone(&self.idle),
            })
    }

    /// Resolve once no classification is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }

    fn policy(&self) -> ThresholdPolicy {
        match self.settings.read() {
            Ok(settings) => ThresholdPolicy::from(&*settings),
            Err(poisoned) => ThresholdPolicy::from(&*poisoned.into_inner()),
        }
    }

    /// Admit `unit` and classify it on a new task, or drop it if busy.
    ///
    /// Returns whether the unit was admitted.
    pub fn submit(self: &Arc<Self>, unit: AudioUnit) -> bool {
        let Some(guard) = self.try_admit() else {
            log::debug!("[Dispatcher] Busy; dropping unit {}", unit.id);
            remove_unit_file(&unit.path);
            self.telemetry.publish(PipelineEvent::UnitDropped {
                recording_id: unit.id,
            });
            return false;
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            this.process(unit).await;
        });
        true
    }

    /// Classify one unit, record and publish the decision.
    ///
    /// Does not check admission; callers going through `submit` hold the
    /// in-flight slot for the duration.
    pub async fn process(&self, unit: AudioUnit) -> ClassificationDecision {
        let outcome = tokio::time::timeout(self.classify_timeout, self.classifier.classify(&unit))
            .await
            .unwrap_or_else(|_| Err(RemoteError::timeout("classify", self.classify_timeout)));

        let decision = match outcome {
            Ok(predictions) => self.policy().apply(&predictions, &unit.id),
            Err(err) => {
                log_remote_error(&err, "classify");
                ClassificationDecision::failed(unit.id.clone(), err.message())
            }
        };

        remove_unit_file(&unit.path);

        if let Err(err) = self.results.record(decision.clone()) {
            log_storage_error(&err, "record_decision");
        }
        self.telemetry.publish(PipelineEvent::DecisionRecorded {
            recording_id: decision.recording_id().to_string(),
            label: decision.label().to_string(),
            confidence: decision.confidence(),
            failed: decision.is_error(),
        });
        log::info!(
            "[Dispatcher] {} -> {} ({:.2})",
            decision.recording_id(),
            decision.label(),
            decision.confidence()
        );

        let _ = self.decision_tx.send(decision.clone());
        decision
    }

    /// Consume audio units until cancelled or the channel closes.
    pub async fn run(self: Arc<Self>, mut units: broadcast::Receiver<AudioUnit>, cancel: CancellationToken) {
        log::info!("[Dispatcher] Listening for audio units");
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = units.recv() => received,
            };
            match received {
                Ok(unit) => {
                    self.submit(unit);
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Skipped units' files stay on disk until the startup sweep.
                    log::warn!("[Dispatcher] Lagged behind capture; {} units skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        log::info!("[Dispatcher] Stopped");
    }
}
