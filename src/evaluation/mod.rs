//! User feedback on past decisions.
//!
//! `EvaluationChannel::submit` turns a stored decision plus a correctness
//! judgment into an `EvaluationRecord`, makes one remote attempt and reports
//! progress on the evaluation status channel. Failures are never retried.

mod device;

pub use device::DeviceIdentifier;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::broadcast;

use crate::detection::ClassificationDecision;
use crate::error::{log_remote_error, ErrorCode, RemoteError};
use crate::remote::EvaluationApi;
use crate::telemetry::{PipelineEvent, TelemetryCollector};

fn serialize_rfc3339<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.to_rfc3339())
}

/// Body of an evaluation submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub device_id: String,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub recording_date: DateTime<Utc>,
    pub recording_name: String,
    pub detection_class: String,
    pub detection_confidence: f32,
    pub success: bool,
}

impl EvaluationRecord {
    pub fn from_decision(
        device_id: String,
        decision: &ClassificationDecision,
        is_correct: bool,
    ) -> Self {
        Self {
            device_id,
            recording_date: decision.timestamp(),
            recording_name: decision.recording_id().to_string(),
            detection_class: decision.label().to_string(),
            detection_confidence: decision.confidence(),
            success: is_correct,
        }
    }
}

/// Progress of one submission
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationStatus {
    Submitting,
    Submitted,
    Failed(String),
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationStatus::Submitting => write!(f, "submitting"),
            EvaluationStatus::Submitted => write!(f, "submitted successfully"),
            EvaluationStatus::Failed(message) => write!(f, "submission failed: {}", message),
        }
    }
}

pub struct EvaluationChannel {
    api: Arc<dyn EvaluationApi>,
    devices: Arc<DeviceIdentifier>,
    status_tx: broadcast::Sender<EvaluationStatus>,
    telemetry: Arc<TelemetryCollector>,
    timeout: Duration,
}

impl EvaluationChannel {
    pub fn new(
        api: Arc<dyn EvaluationApi>,
        devices: Arc<DeviceIdentifier>,
        status_tx: broadcast::Sender<EvaluationStatus>,
        telemetry: Arc<TelemetryCollector>,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            devices,
            status_tx,
            telemetry,
            timeout,
        }
    }

    pub fn device_id(&self) -> String {
        self.devices.get_or_create()
    }

    /// Submit one judgment. Returns true when the server accepted it.
    pub async fn submit(&self, decision: &ClassificationDecision, is_correct: bool) -> bool {
        let record = EvaluationRecord::from_decision(self.device_id(), decision, is_correct);
        let _ = self.status_tx.send(EvaluationStatus::Submitting);

        let outcome = tokio::time::timeout(self.timeout, self.api.submit(&record))
            .await
            .unwrap_or_else(|_| Err(RemoteError::timeout("submit_evaluation", self.timeout)));

        let accepted = match outcome {
            Ok(()) => {
                log::info!("[Evaluation] Submitted {}", record.recording_name);
                let _ = self.status_tx.send(EvaluationStatus::Submitted);
                true
            }
            Err(err) => {
                log_remote_error(&err, "submit_evaluation");
                let _ = self.status_tx.send(EvaluationStatus::Failed(err.message()));
                false
            }
        };

        self.telemetry.publish(PipelineEvent::EvaluationSubmitted {
            recording_id: record.recording_name,
            is_correct,
            accepted,
        });
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingApi {
        received: Mutex<Vec<EvaluationRecord>>,
        result: Result<(), RemoteError>,
        delay: Duration,
    }

    #[async_trait]
    impl EvaluationApi for RecordingApi {
        async fn submit(&self, record: &EvaluationRecord) -> Result<(), RemoteError> {
            tokio::time::sleep(self.delay).await;
            self.received.lock().unwrap().push(record.clone());
            self.result.clone()
        }
    }

    fn channel(
        result: Result<(), RemoteError>,
        delay: Duration,
    ) -> (
        EvaluationChannel,
        Arc<RecordingApi>,
        broadcast::Receiver<EvaluationStatus>,
    ) {
        let api = Arc::new(RecordingApi {
            received: Mutex::new(Vec::new()),
            result,
            delay,
        });
        let (tx, rx) = broadcast::channel(8);
        let channel = EvaluationChannel::new(
            api.clone(),
            Arc::new(DeviceIdentifier::new(Arc::new(MemoryStore::new()))),
            tx,
            Arc::new(TelemetryCollector::default()),
            Duration::from_secs(5),
        );
        (channel, api, rx)
    }

    fn decision() -> ClassificationDecision {
        ClassificationDecision::new("dog".to_string(), None, 0.8, None, "rec42".to_string())
    }

    #[test]
    fn test_record_wire_shape() {
        let record = EvaluationRecord::from_decision("dev".to_string(), &decision(), true);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["device_id"], "dev");
        assert_eq!(json["recording_name"], "rec42");
        assert_eq!(json["detection_class"], "dog");
        assert_eq!(json["success"], true);
        assert!(json["recording_date"].as_str().unwrap().ends_with("+00:00"));
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(EvaluationStatus::Submitting.to_string(), "submitting");
        assert_eq!(
            EvaluationStatus::Submitted.to_string(),
            "submitted successfully"
        );
    }

    #[tokio::test]
    async fn test_successful_submission_status_sequence() {
        let (channel, api, mut rx) = channel(Ok(()), Duration::ZERO);
        assert!(channel.submit(&decision(), false).await);

        assert_eq!(rx.recv().await.unwrap(), EvaluationStatus::Submitting);
        assert_eq!(rx.recv().await.unwrap(), EvaluationStatus::Submitted);

        let received = api.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].success);
        assert_eq!(received[0].device_id, channel.device_id());
    }

    #[tokio::test]
    async fn test_rejected_submission_reports_failure() {
        let (channel, _api, mut rx) = channel(
            Err(RemoteError::Rejected {
                status: "error".to_string(),
            }),
            Duration::ZERO,
        );
        assert!(!channel.submit(&decision(), true).await);
        assert_eq!(rx.recv().await.unwrap(), EvaluationStatus::Submitting);
        assert!(matches!(rx.recv().await.unwrap(), EvaluationStatus::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_single_attempt() {
        let (channel, api, mut rx) = channel(Ok(()), Duration::from_secs(6));
        assert!(!channel.submit(&decision(), true).await);
        assert_eq!(rx.recv().await.unwrap(), EvaluationStatus::Submitting);
        match rx.recv().await.unwrap() {
            EvaluationStatus::Failed(message) => assert!(message.contains("timed out")),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(api.received.lock().unwrap().is_empty());
    }
}
