//! Serverless gateway API endpoints

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use qwatch_core::domain::job::JobRow;
use qwatch_core::status::map_display_status;

use crate::error::{ClientError, Result};
use crate::provider::ListJobsFilter;

/// HTTP client for the serverless gateway API
///
/// Covers job listing, runtime job discovery, log retrieval, and job stop
/// requests. All endpoints authenticate with a bearer token; an optional
/// service instance is sent as the `Service-CRN` header.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    token: String,
    instance: Option<String>,
    client: Client,
}

impl GatewayClient {
    /// Create a new gateway client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the gateway (e.g., "https://gateway.example.com")
    /// * `token` - Bearer token for authentication
    /// * `instance` - Optional service instance identifier
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, instance: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            instance,
            client: Client::new(),
        }
    }

    /// Get the base URL of the gateway
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List serverless job summary rows matching the filter
    ///
    /// When several statuses are requested, the gateway is queried once per
    /// status and the pages are merged, deduplicated by job id.
    pub async fn list_jobs(&self, filter: &ListJobsFilter) -> Result<Vec<JobRow>> {
        match &filter.statuses {
            None => self.list_jobs_page(filter, None).await,
            Some(statuses) if statuses.is_empty() => self.list_jobs_page(filter, None).await,
            Some(statuses) => {
                let mut pages = Vec::with_capacity(statuses.len());
                for status in statuses {
                    pages.push(self.list_jobs_page(filter, Some(status)).await?);
                }
                Ok(merge_rows(pages))
            }
        }
    }

    async fn list_jobs_page(&self, filter: &ListJobsFilter, status: Option<&str>) -> Result<Vec<JobRow>> {
        let url = format!("{}/api/v1/jobs", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[("limit", filter.limit.to_string()), ("offset", filter.offset.to_string())]);
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        if let Some(created_after) = &filter.created_after {
            request = request.query(&[("created_after", created_after.to_rfc3339())]);
        }

        debug!("Listing jobs (status filter: {:?})", status);
        let response = self.authorize(request).send().await?;
        let page: JobsPage = self.handle_response(response).await?;

        Ok(page.jobs.into_iter().map(to_row).collect())
    }

    /// List the runtime job ids attached to a serverless job
    pub async fn runtime_job_ids(&self, job_id: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/v1/jobs/{}/runtime_jobs", self.base_url, job_id);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let body: RuntimeJobsResponse = self.handle_response(response).await?;

        Ok(body.runtime_jobs)
    }

    /// Fetch the full log text of a serverless job
    pub async fn job_logs(&self, job_id: &str) -> Result<String> {
        let url = format!("{}/api/v1/jobs/{}/logs", self.base_url, job_id);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let body: LogsResponse = self.handle_response(response).await?;

        Ok(body.logs)
    }

    /// Request a serverless job stop
    pub async fn stop_job(&self, job_id: &str) -> Result<()> {
        let url = format!("{}/api/v1/jobs/{}/stop", self.base_url, job_id);
        let response = self.authorize(self.client.post(&url)).send().await?;

        self.handle_empty_response(response).await
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(&self.token);
        match &self.instance {
            Some(instance) => request.header("Service-CRN", instance),
            None => request,
        }
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no useful body
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
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

// =============================================================================
// Wire DTOs
// =============================================================================

#[derive(Debug, Deserialize)]
struct JobsPage {
    #[serde(default)]
    jobs: Vec<GatewayJob>,
}

#[derive(Debug, Deserialize)]
struct GatewayJob {
    id: String,
    status: Option<String>,
    sub_status: Option<String>,
    created: Option<chrono::DateTime<chrono::Utc>>,
    program: Option<ProgramInfo>,
    provider: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProgramInfo {
    title: Option<String>,
    provider: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RuntimeJobsResponse {
    #[serde(default)]
    runtime_jobs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LogsResponse {
    #[serde(default)]
    logs: String,
}

fn to_row(job: GatewayJob) -> JobRow {
    let status = map_display_status(
        job.status.as_deref().unwrap_or("Unknown"),
        job.sub_status.as_deref(),
    );
    let function = display_function_name(&job);
    JobRow {
        job_id: job.id,
        status,
        sub_status: job.sub_status,
        created: job.created,
        function,
        runtime_jobs: Vec::new(),
    }
}

/// Display name for a job's function: `provider/title` when a provider is
/// known, else the bare title.
fn display_function_name(job: &GatewayJob) -> Option<String> {
    let title = job.program.as_ref().and_then(|p| p.title.clone())?;
    let provider = job
        .program
        .as_ref()
        .and_then(|p| provider_name(p.provider.as_ref()))
        .or_else(|| provider_name(job.provider.as_ref()));
    match provider {
        Some(provider) => Some(format!("{provider}/{title}")),
        None => Some(title),
    }
}

// The gateway serves the provider as either an object with a name or a bare
// string depending on the endpoint version.
fn provider_name(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Object(map) => map
            .get("name")
            .and_then(|name| name.as_str())
            .map(str::to_string),
        serde_json::Value::String(name) if !name.is_empty() => Some(name.clone()),
        _ => None,
    }
}

fn merge_rows(pages: Vec<Vec<JobRow>>) -> Vec<JobRow> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for page in pages {
        for row in page {
            if seen.insert(row.job_id.clone()) {
                merged.push(row);
            }
        }
    }
    merged
}
