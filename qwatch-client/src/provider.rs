//! The narrow provider interface consumed by the engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qwatch_core::domain::job::JobRow;

use crate::error::Result;
use crate::gateway::GatewayClient;
use crate::runtime::RuntimeClient;

/// Filters applied when listing serverless jobs.
#[derive(Debug, Clone, Default)]
pub struct ListJobsFilter {
    /// When set, the gateway is queried once per status and the results are
    /// merged, deduplicated by job id (first occurrence wins).
    pub statuses: Option<Vec<String>>,
    pub created_after: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

/// Current status of a runtime job.
#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub status: String,
    pub backend: String,
}

/// Remote source of serverless jobs and their runtime jobs.
///
/// Every call is a single fallible request; callers own all caching, retry,
/// and concurrency policy.
#[async_trait]
pub trait JobProvider: Send + Sync {
    /// List serverless job summary rows matching the filter.
    async fn list_jobs(&self, filter: &ListJobsFilter) -> Result<Vec<JobRow>>;

    /// List the runtime job ids currently attached to a serverless job.
    async fn runtime_job_ids(&self, job_id: &str) -> Result<Vec<String>>;

    /// Fetch the current status and backend of a runtime job.
    async fn runtime_job_status(&self, runtime_job_id: &str) -> Result<RuntimeStatus>;

    /// Request a serverless job stop.
    async fn stop_job(&self, job_id: &str) -> Result<()>;

    /// Request a runtime job cancellation.
    async fn cancel_runtime_job(&self, runtime_job_id: &str) -> Result<()>;

    /// Fetch the full log text of a serverless job.
    async fn job_logs(&self, job_id: &str) -> Result<String>;
}

/// Provider backed by the serverless gateway and the runtime service.
#[derive(Debug, Clone)]
pub struct CloudProvider {
    gateway: GatewayClient,
    runtime: RuntimeClient,
}

impl CloudProvider {
    /// Create a provider from the two service clients
    pub fn new(gateway: GatewayClient, runtime: RuntimeClient) -> Self {
        Self { gateway, runtime }
    }
}

#[async_trait]
impl JobProvider for CloudProvider {
    async fn list_jobs(&self, filter: &ListJobsFilter) -> Result<Vec<JobRow>> {
        self.gateway.list_jobs(filter).await
    }

    async fn runtime_job_ids(&self, job_id: &str) -> Result<Vec<String>> {
        self.gateway.runtime_job_ids(job_id).await
    }

    async fn runtime_job_status(&self, runtime_job_id: &str) -> Result<RuntimeStatus> {
        self.runtime.job_status(runtime_job_id).await
    }

    async fn stop_job(&self, job_id: &str) -> Result<()> {
        self.gateway.stop_job(job_id).await
    }

    async fn cancel_runtime_job(&self, runtime_job_id: &str) -> Result<()> {
        self.runtime.cancel_job(runtime_job_id).await
    }

    async fn job_logs(&self, job_id: &str) -> Result<String> {
        self.gateway.job_logs(job_id).await
    }
}
