//! Pipeline telemetry event types exposed to the CLI and to embedding code.

use serde::{Deserialize, Serialize};

/// Discrete events emitted by capture, detection, caching and evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PipelineEvent {
    SessionStarted {
        recording_id: String,
    },
    SilenceRejected {
        recording_id: String,
        rms: f32,
        threshold: f32,
    },
    UnitEmitted {
        recording_id: String,
        rms: f32,
    },
    /// A unit arrived while a classification was already in flight.
    UnitDropped {
        recording_id: String,
    },
    DecisionRecorded {
        recording_id: String,
        label: String,
        confidence: f32,
        failed: bool,
    },
    CaptureFailed {
        code: i32,
        message: String,
    },
    ReferenceRefreshed {
        class_count: usize,
    },
    ReferenceRefreshFailed {
        code: i32,
        message: String,
    },
    EvaluationSubmitted {
        recording_id: String,
        is_correct: bool,
        accepted: bool,
    },
}

impl PipelineEvent {
    /// Short snake_case name, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::SessionStarted { .. } => "session_started",
            PipelineEvent::SilenceRejected { .. } => "silence_rejected",
            PipelineEvent::UnitEmitted { .. } => "unit_emitted",
            PipelineEvent::UnitDropped { .. } => "unit_dropped",
            PipelineEvent::DecisionRecorded { .. } => "decision_recorded",
            PipelineEvent::CaptureFailed { .. } => "capture_failed",
            PipelineEvent::ReferenceRefreshed { .. } => "reference_refreshed",
            PipelineEvent::ReferenceRefreshFailed { .. } => "reference_refresh_failed",
            PipelineEvent::EvaluationSubmitted { .. } => "evaluation_submitted",
        }
    }
}

/// Event plus the wall-clock time it was published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimedEvent {
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub event: PipelineEvent,
}
