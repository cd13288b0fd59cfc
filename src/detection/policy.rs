// ThresholdPolicy - turns raw class probabilities into a gated decision
//
// The top class is selected from the raw probabilities before any
// below-threshold entries are zeroed, so a downgraded decision still names
// the classifier's best guess in `original_label`.

use std::collections::{BTreeMap, HashMap};

use super::decision::{ClassificationDecision, UNKNOWN_LABEL};
use crate::config::DetectionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub threshold: f32,
    pub filter_low_confidence: bool,
    pub include_predictions: bool,
}

impl From<&DetectionConfig> for ThresholdPolicy {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            threshold: config.detection_threshold,
            filter_low_confidence: config.filter_low_confidence,
            include_predictions: config.show_all_predictions,
        }
    }
}

/// Highest-probability class. Ties resolve to the lexicographically first
/// label; non-finite probabilities count as 0.
pub fn raw_top(predictions: &BTreeMap<String, f32>) -> Option<(&str, f32)> {
    let mut best: Option<(&str, f32)> = None;
    for (label, &probability) in predictions {
        let probability = if probability.is_finite() {
            probability
        } else {
            0.0
        };
        match best {
            Some((_, current)) if probability <= current => {}
            _ => best = Some((label.as_str(), probability)),
        }
    }
    best
}

impl ThresholdPolicy {
    pub fn apply(
        &self,
        predictions: &HashMap<String, f32>,
        recording_id: &str,
    ) -> ClassificationDecision {
        let ordered: BTreeMap<String, f32> = predictions
            .iter()
            .map(|(label, probability)| (label.clone(), *probability))
            .collect();

        let (label, original_label, confidence) = match raw_top(&ordered) {
            None => (UNKNOWN_LABEL.to_string(), None, 0.0),
            Some((top, confidence)) if confidence >= self.threshold => {
                (top.to_string(), None, confidence)
            }
            Some((top, confidence)) if self.filter_low_confidence => (
                UNKNOWN_LABEL.to_string(),
                Some(top.to_string()),
                confidence,
            ),
            Some((_, confidence)) if confidence == 0.0 => (UNKNOWN_LABEL.to_string(), None, 0.0),
            Some((top, confidence)) => (top.to_string(), None, confidence),
        };

        let attached = self.include_predictions.then(|| {
            if self.filter_low_confidence {
                ordered
                    .iter()
                    .map(|(label, &p)| (label.clone(), if p < self.threshold { 0.0 } else { p }))
                    .collect()
            } else {
                ordered.clone()
            }
        });

        ClassificationDecision::new(
            label,
            original_label,
            confidence,
            attached,
            recording_id.to_string(),
        )
    }
}
