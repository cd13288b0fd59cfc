//! Remote service seams: classifier, evaluation, reference data and health.
//!
//! Each service is an async trait so the pipeline can run against the HTTP
//! client in production and against in-process fakes in tests. Deadlines are
//! enforced by the calling component, not by the implementations.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::audio::AudioUnit;
use crate::cache::ReferenceClass;
use crate::error::RemoteError;
use crate::evaluation::EvaluationRecord;

mod http;
mod types;

pub use http::HttpApiClient;
pub use types::{EvaluationResponse, HealthStatus, PredictResponse};

/// Submits an audio unit and returns per-class probabilities.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, unit: &AudioUnit) -> Result<HashMap<String, f32>, RemoteError>;
}

/// Accepts a user's correctness judgment for a past decision.
#[async_trait]
pub trait EvaluationApi: Send + Sync {
    async fn submit(&self, record: &EvaluationRecord) -> Result<(), RemoteError>;
}

/// Lists the server-defined reference classes.
#[async_trait]
pub trait ReferenceApi: Send + Sync {
    async fn fetch_classes(&self) -> Result<Vec<ReferenceClass>, RemoteError>;
}

#[async_trait]
pub trait HealthApi: Send + Sync {
    async fn health(&self) -> Result<HealthStatus, RemoteError>;
}
