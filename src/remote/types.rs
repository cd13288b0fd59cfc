// Wire payloads exchanged with the classification server

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Body of `POST /audio/predict`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub predictions: Option<HashMap<String, f32>>,
}

/// Body of `POST /audio/evaluations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl EvaluationResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: Option<bool>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "ok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_response_without_predictions() {
        let parsed: PredictResponse = serde_json::from_str(r#"{"detail":"x"}"#).unwrap();
        assert!(parsed.predictions.is_none());

        let parsed: PredictResponse =
            serde_json::from_str(r#"{"predictions":{"dog":0.7,"cat":0.3}}"#).unwrap();
        assert_eq!(parsed.predictions.unwrap().len(), 2);
    }

    #[test]
    fn test_health_status() {
        let ok: HealthStatus = serde_json::from_str(r#"{"status":"ok","model_loaded":true}"#).unwrap();
        assert!(ok.is_healthy());
        let loading: HealthStatus = serde_json::from_str(r#"{"status":"loading"}"#).unwrap();
        assert!(!loading.is_healthy());
        assert_eq!(loading.model_loaded, None);
    }

    #[test]
    fn test_evaluation_response_status() {
        let ok: EvaluationResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(ok.is_success());
        let bad: EvaluationResponse =
            serde_json::from_str(r#"{"status":"error","message":"db"}"#).unwrap();
        assert!(!bad.is_success());
    }
}
