//! REST API client for the pipeline backend.
//!
//! Wraps the HTTP endpoints the observer needs (run submission, status
//! query, health) using [`reqwest`], and builds the video locator for
//! completed runs.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shorts_core::error::{validate_execution_id, CoreError};
use shorts_core::status::{ExecutionStatus, Lifecycle};
use shorts_core::tracker::ExecutionView;
use shorts_core::types::ExecutionId;

use crate::transport::{StatusSource, TransportError};

/// HTTP client for one backend instance.
pub struct ShortsApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of `POST /api/generate`.
#[derive(Debug, Default, Serialize)]
pub struct GenerateRequest {
    /// Topic for the short; the backend researches one when absent.
    pub topic: Option<String>,
    /// Per-run overrides deep-merged into the backend configuration.
    pub config_overrides: Option<serde_json::Value>,
}

/// Response of `POST /api/generate`.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Identifier of the run that was just queued.
    pub execution_id: ExecutionId,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, body).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend has no execution with this id.
    #[error("Execution {0} not found")]
    NotFound(ExecutionId),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The backend answered with something that violates the domain model.
    #[error("Invalid backend response: {0}")]
    Invalid(#[from] CoreError),
}

impl ShortsApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client whose requests give up after `timeout`.
    pub fn with_timeout(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Start a pipeline run.
    ///
    /// Sends `POST /api/generate` and returns the new execution id. The
    /// run itself proceeds in the background on the server.
    pub async fn submit(&self, request: &GenerateRequest) -> Result<ExecutionId, ApiError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.api_url))
            .json(request)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        let execution_id = validate_execution_id(submitted.execution_id)?;

        tracing::info!(execution_id, topic = ?request.topic, "Execution submitted");
        Ok(execution_id)
    }

    /// Query the current status of a run (`GET /api/status/{id}`).
    pub async fn status(&self, execution_id: ExecutionId) -> Result<ExecutionStatus, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/status/{}", self.api_url, execution_id))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(execution_id));
        }
        Self::parse_response(response).await
    }

    /// Run the backend's dependency checks (`GET /api/health`).
    pub async fn health(&self) -> Result<serde_json::Value, ApiError> {
        let response = self
            .client
            .get(format!("{}/api/health", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Locator of the rendered video for a run.
    pub fn video_url(&self, execution_id: ExecutionId) -> String {
        format!("{}/api/video/{}", self.api_url, execution_id)
    }

    /// Locator of the rendered video, only once the view shows the run
    /// completed.
    pub fn video_url_for(&self, view: &ExecutionView) -> Option<String> {
        match (view.execution_id, view.status) {
            (Some(id), Lifecycle::Completed) => Some(self.video_url(id)),
            _ => None,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl StatusSource for ShortsApi {
    async fn fetch_status(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ExecutionStatus, TransportError> {
        self.status(execution_id)
            .await
            .map_err(|e| TransportError::Status(e.to_string()))
    }
}
