//! Runtime service API endpoints

use reqwest::Client;
use serde::Deserialize;

use qwatch_core::domain::job::UNKNOWN_BACKEND;

use crate::error::{ClientError, Result};
use crate::provider::RuntimeStatus;

/// HTTP client for the runtime service API
///
/// Only the two per-job calls the console needs: status fetch and cancel.
#[derive(Debug, Clone)]
pub struct RuntimeClient {
    base_url: String,
    token: String,
    client: Client,
}

impl RuntimeClient {
    /// Create a new runtime service client
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    /// Get the base URL of the runtime service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the current status and backend of a runtime job
    pub async fn job_status(&self, runtime_job_id: &str) -> Result<RuntimeStatus> {
        let url = format!("{}/api/v1/jobs/{}", self.base_url, runtime_job_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let detail: RuntimeJobDetail = response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))?;

        Ok(RuntimeStatus {
            status: detail.status.unwrap_or_default(),
            backend: detail
                .backend
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| UNKNOWN_BACKEND.to_string()),
        })
    }

    /// Request a runtime job cancellation
    pub async fn cancel_job(&self, runtime_job_id: &str) -> Result<()> {
        let url = format!("{}/api/v1/jobs/{}/cancel", self.base_url, runtime_job_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RuntimeJobDetail {
    status: Option<String>,
    backend: Option<String>,
}
