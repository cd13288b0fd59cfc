// ClassificationDecision - the gated outcome of classifying one audio unit

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label used when a result is downgraded or the classifier failed
pub const UNKNOWN_LABEL: &str = "unknown";

/// Immutable classification outcome.
///
/// Constructed only by the detection pipeline; consumers read it through
/// accessors and may persist it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationDecision {
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_label: Option<String>,
    confidence: f32,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    predictions: Option<BTreeMap<String, f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    recording_id: String,
}

impl ClassificationDecision {
    pub(crate) fn new(
        label: String,
        original_label: Option<String>,
        confidence: f32,
        predictions: Option<BTreeMap<String, f32>>,
        recording_id: String,
    ) -> Self {
        Self {
            label,
            original_label,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            predictions,
            error: None,
            recording_id,
        }
    }

    /// "unknown" with confidence 0 and `error` set.
    pub(crate) fn failed(recording_id: String, error: String) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            original_label: None,
            confidence: 0.0,
            timestamp: Utc::now(),
            predictions: None,
            error: Some(error),
            recording_id,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Top raw label, present only when `label` was downgraded to "unknown".
    pub fn original_label(&self) -> Option<&str> {
        self.original_label.as_deref()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn predictions(&self) -> Option<&BTreeMap<String, f32>> {
        self.predictions.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn recording_id(&self) -> &str {
        &self.recording_id
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}
