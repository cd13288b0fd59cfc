// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use tokio::sync::broadcast;

use crate::audio::{AudioLevelSample, AudioUnit, CaptureChannels};
use crate::cache::ReferenceClass;
use crate::detection::ClassificationDecision;
use crate::evaluation::EvaluationStatus;

/// Level samples arrive at 10/s; two seconds of slack for slow subscribers
const LEVEL_BUFFER: usize = 20;
const COUNTDOWN_BUFFER: usize = 16;
/// Units are consumed immediately by the dispatcher
const UNIT_BUFFER: usize = 4;
const DECISION_BUFFER: usize = 100;
const EVALUATION_STATUS_BUFFER: usize = 16;
const REFERENCE_CLASSES_BUFFER: usize = 4;

/// Manages all tokio broadcast channels
///
/// Single Responsibility: Broadcast channel lifecycle and subscription
///
/// Every channel is created up front so subscribers can attach before the
/// pipeline starts. Delivery is deliver-or-drop: a send with no subscribers
/// is not an error, and a lagging subscriber skips old messages.
///
/// # Channel Types
/// - Levels: normalized microphone level samples (UI meter)
/// - Countdown: remaining seconds of the active recording session
/// - Units: finalized audio units for the dispatcher
/// - Decisions: classification decisions
/// - Evaluation Status: progress of feedback submissions
/// - Reference Classes: snapshot after every successful refresh
pub struct BroadcastChannelManager {
    levels: broadcast::Sender<AudioLevelSample>,
    countdown: broadcast::Sender<u32>,
    units: broadcast::Sender<AudioUnit>,
    decisions: broadcast::Sender<ClassificationDecision>,
    evaluation_status: broadcast::Sender<EvaluationStatus>,
    reference_classes: broadcast::Sender<Vec<ReferenceClass>>,
}

impl BroadcastChannelManager {
    pub fn new() -> Self {
        Self {
            levels: broadcast::channel(LEVEL_BUFFER).0,
            countdown: broadcast::channel(COUNTDOWN_BUFFER).0,
            units: broadcast::channel(UNIT_BUFFER).0,
            decisions: broadcast::channel(DECISION_BUFFER).0,
            evaluation_status: broadcast::channel(EVALUATION_STATUS_BUFFER).0,
            reference_classes: broadcast::channel(REFERENCE_CLASSES_BUFFER).0,
        }
    }

    // ========================================================================
    // CAPTURE CHANNELS
    // ========================================================================

    /// Publish side handed to the capture controller
    pub fn capture_channels(&self) -> CaptureChannels {
        CaptureChannels {
            levels: self.levels.clone(),
            countdown: self.countdown.clone(),
            units: self.units.clone(),
        }
    }

    pub fn subscribe_levels(&self) -> broadcast::Receiver<AudioLevelSample> {
        self.levels.subscribe()
    }

    pub fn subscribe_countdown(&self) -> broadcast::Receiver<u32> {
        self.countdown.subscribe()
    }

    /// Subscribe to finalized audio units
    ///
    /// # Notes
    /// - A subscriber takes ownership of each unit's file and must delete it
    /// - Units emitted while nobody is subscribed are deleted by the controller
    pub fn subscribe_units(&self) -> broadcast::Receiver<AudioUnit> {
        self.units.subscribe()
    }

    // ========================================================================
    // DECISION CHANNEL
    // ========================================================================

    pub fn decision_sender(&self) -> broadcast::Sender<ClassificationDecision> {
        self.decisions.clone()
    }

    /// Subscribe to classification decisions
    ///
    /// Each subscriber receives independent copies of all decisions published
    /// after it subscribed.
    pub fn subscribe_decisions(&self) -> broadcast::Receiver<ClassificationDecision> {
        self.decisions.subscribe()
    }

    // ========================================================================
    // EVALUATION STATUS CHANNEL
    // ========================================================================

    pub fn evaluation_status_sender(&self) -> broadcast::Sender<EvaluationStatus> {
        self.evaluation_status.clone()
    }

    pub fn subscribe_evaluation_status(&self) -> broadcast::Receiver<EvaluationStatus> {
        self.evaluation_status.subscribe()
    }

    // ========================================================================
    // REFERENCE CLASSES CHANNEL
    // ========================================================================

    pub fn reference_classes_sender(&self) -> broadcast::Sender<Vec<ReferenceClass>> {
        self.reference_classes.clone()
    }

    pub fn subscribe_reference_classes(&self) -> broadcast::Receiver<Vec<ReferenceClass>> {
        self.reference_classes.subscribe()
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers_is_dropped() {
        let manager = BroadcastChannelManager::new();
        assert!(manager.decision_sender().send(
            ClassificationDecision::failed("r".to_string(), "x".to_string())
        ).is_err());
    }

    #[tokio::test]
    async fn test_multiple_independent_subscribers() {
        let manager = BroadcastChannelManager::new();
        let mut first = manager.subscribe_evaluation_status();
        let mut second = manager.subscribe_evaluation_status();

        manager
            .evaluation_status_sender()
            .send(EvaluationStatus::Submitting)
            .unwrap();

        assert_eq!(first.recv().await.unwrap(), EvaluationStatus::Submitting);
        assert_eq!(second.recv().await.unwrap(), EvaluationStatus::Submitting);
    }

    #[tokio::test]
    async fn test_capture_channels_share_underlying_senders() {
        let manager = BroadcastChannelManager::new();
        let mut countdown = manager.subscribe_countdown();
        manager.capture_channels().countdown.send(3).unwrap();
        assert_eq!(countdown.recv().await.unwrap(), 3);
    }
}
