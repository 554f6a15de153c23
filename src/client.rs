//! The compute boundary between the map frontend and the evaluation
//! service.
//!
//! [`EvaluateClient`] is the seam: the controller talks to it and never
//! knows whether evaluation runs in-process or behind HTTP. Both sides of
//! the boundary exchange the same request/response types.

use std::time::Duration;

use crate::error::MilehighError;
use crate::evaluator::{evaluate, EvaluationResult};
use crate::features::FeatureCatalog;
use crate::parcel::ParcelSet;
use crate::policy::EvaluationConfig;

/// Default request timeout for the HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub trait EvaluateClient {
    /// Runs one evaluation for `config` and returns the full result.
    fn evaluate(&self, config: &EvaluationConfig) -> Result<EvaluationResult, MilehighError>;
}

/// Runs evaluations directly against in-memory data. Used by the one-shot
/// CLI path and by the server's engine thread.
pub struct InProcessClient {
    parcels: ParcelSet,
    catalog: FeatureCatalog,
}

impl InProcessClient {
    #[must_use]
    pub fn new(parcels: ParcelSet, catalog: FeatureCatalog) -> Self {
        InProcessClient { parcels, catalog }
    }

    #[must_use]
    pub fn parcels(&self) -> &ParcelSet {
        &self.parcels
    }

    #[must_use]
    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }
}

impl EvaluateClient for InProcessClient {
    fn evaluate(&self, config: &EvaluationConfig) -> Result<EvaluationResult, MilehighError> {
        evaluate(&self.parcels, &self.catalog, config)
    }
}

/// Talks to a remote evaluation server over HTTP. Requests time out after
/// [`DEFAULT_TIMEOUT`] unless overridden; a timeout surfaces as a normal
/// request failure for the controller to report.
pub struct HttpClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Result<Self, MilehighError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, MilehighError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(HttpClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl EvaluateClient for HttpClient {
    fn evaluate(&self, config: &EvaluationConfig) -> Result<EvaluationResult, MilehighError> {
        let url = format!("{}/api/evaluate", self.base_url);
        let response = self.client.post(&url).json(config).send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(MilehighError::MilehighError(format!(
                "evaluate request failed with {status}: {body}"
            )));
        }
        Ok(response.json()?)
    }
}
