//! HTTP implementation of every remote seam, backed by one shared
//! `reqwest::Client`.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::types::{EvaluationResponse, HealthStatus, PredictResponse};
use super::{Classifier, EvaluationApi, HealthApi, ReferenceApi};
use crate::audio::AudioUnit;
use crate::cache::ReferenceClass;
use crate::config::ServerConfig;
use crate::error::RemoteError;
use crate::evaluation::EvaluationRecord;

/// Client for the classification server.
#[derive(Clone)]
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpApiClient {
    pub fn new(server: &ServerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: server.base_url.trim_end_matches('/').to_string(),
            auth_token: server.auth_token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn ensure_success(response: &reqwest::Response) -> Result<(), RemoteError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RemoteError::HttpStatus {
                status: status.as_u16(),
            })
        }
    }
}

/// Upload file name for a unit; the server only accepts `.wav`.
fn upload_name(unit: &AudioUnit) -> String {
    unit.path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".wav"))
        .unwrap_or_else(|| format!("{}.wav", unit.id))
}

#[async_trait]
impl Classifier for HttpApiClient {
    async fn classify(&self, unit: &AudioUnit) -> Result<HashMap<String, f32>, RemoteError> {
        let bytes = tokio::fs::read(&unit.path)
            .await
            .map_err(|err| RemoteError::AudioRead {
                reason: format!("{}: {}", unit.path.display(), err),
            })?;

        let part = Part::bytes(bytes)
            .file_name(upload_name(unit))
            .mime_str("audio/wav")?;
        let form = Form::new().part("file", part);

        log::debug!("[HttpApi] POST /audio/predict ({})", unit.id);
        let response = self
            .client
            .post(self.url("/audio/predict"))
            .multipart(form)
            .send()
            .await?;
        Self::ensure_success(&response)?;

        let body: PredictResponse = response.json().await?;
        body.predictions
            .ok_or_else(|| RemoteError::MalformedResponse {
                reason: "response has no predictions".to_string(),
            })
    }
}

#[async_trait]
impl EvaluationApi for HttpApiClient {
    async fn submit(&self, record: &EvaluationRecord) -> Result<(), RemoteError> {
        log::debug!(
            "[HttpApi] POST /audio/evaluations ({})",
            record.recording_name
        );
        let response = self
            .client
            .post(self.url("/audio/evaluations"))
            .json(record)
            .send()
            .await?;
        Self::ensure_success(&response)?;

        let body: EvaluationResponse = response.json().await?;
        if body.is_success() {
            Ok(())
        } else {
            Err(RemoteError::Rejected {
                status: body.status,
            })
        }
    }
}

#[async_trait]
impl ReferenceApi for HttpApiClient {
    async fn fetch_classes(&self) -> Result<Vec<ReferenceClass>, RemoteError> {
        let mut request = self.client.get(self.url("/alerts/classes"));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        Self::ensure_success(&response)?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl HealthApi for HttpApiClient {
    async fn health(&self) -> Result<HealthStatus, RemoteError> {
        let response = self.client.get(self.url("/health")).send().await?;
        Self::ensure_success(&response)?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn unit(path: &str) -> AudioUnit {
        AudioUnit {
            id: "recording_1".to_string(),
            path: PathBuf::from(path),
            rms: 0.5,
            captured_at: chrono::Utc::now(),
            duration: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = HttpApiClient::new(&ServerConfig {
            base_url: "http://example.test:8000/".to_string(),
            ..ServerConfig::default()
        });
        assert_eq!(client.base_url(), "http://example.test:8000");
        assert_eq!(
            client.url("/health"),
            "http://example.test:8000/health"
        );
    }

    #[test]
    fn test_upload_name_always_wav() {
        assert_eq!(upload_name(&unit("/tmp/a.wav")), "a.wav");
        assert_eq!(upload_name(&unit("/tmp/a.raw")), "recording_1.wav");
    }

    #[tokio::test]
    async fn test_missing_audio_file_is_audio_read_error() {
        let client = HttpApiClient::new(&ServerConfig::default());
        let err = client
            .classify(&unit("/nonexistent/soundwatch/a.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::AudioRead { .. }));
    }
}
