use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use super::EngineHandle;
use crate::audio::{AudioLevelSample, CaptureState};
use crate::cache::ReferenceClass;
use crate::detection::ClassificationDecision;
use crate::evaluation::EvaluationStatus;
use crate::telemetry::TimedEvent;

impl EngineHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    pub fn subscribe_decisions(&self) -> broadcast::Receiver<ClassificationDecision> {
        self.broadcasts.subscribe_decisions()
    }

    /// Decisions as a `Stream`; messages missed by a lagging consumer are skipped.
    pub fn decision_stream(&self) -> impl Stream<Item = ClassificationDecision> + Send + 'static {
        BroadcastStream::new(self.broadcasts.subscribe_decisions()).filter_map(|item| match item {
            Ok(decision) => Some(decision),
            Err(err) => {
                log::warn!("[Engine] Decision stream: {}", err);
                None
            }
        })
    }

    pub fn subscribe_levels(&self) -> broadcast::Receiver<AudioLevelSample> {
        self.broadcasts.subscribe_levels()
    }

    pub fn subscribe_countdown(&self) -> broadcast::Receiver<u32> {
        self.broadcasts.subscribe_countdown()
    }

    pub fn subscribe_evaluation_status(&self) -> broadcast::Receiver<EvaluationStatus> {
        self.broadcasts.subscribe_evaluation_status()
    }

    pub fn subscribe_reference_classes(&self) -> broadcast::Receiver<Vec<ReferenceClass>> {
        self.broadcasts.subscribe_reference_classes()
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TimedEvent> {
        self.telemetry.subscribe()
    }

    // ========================================================================
    // LATEST-VALUE STATE
    // ========================================================================

    pub fn subscribe_capture_state(&self) -> watch::Receiver<CaptureState> {
        self.capture.subscribe_state()
    }

    /// Advisory below-microphone-threshold flag, refreshed every level tick.
    pub fn subscribe_below_threshold(&self) -> watch::Receiver<bool> {
        self.capture.subscribe_below_threshold()
    }
}
