//! Serverless and runtime job domain types

use serde::{Deserialize, Serialize};

/// Sentinel backend name used until a runtime job has reported one.
pub const UNKNOWN_BACKEND: &str = "(unknown)";

/// Summary row for a serverless job as listed by the gateway.
///
/// `runtime_jobs` starts empty and is filled from the shared cache before
/// rendering or serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRow {
    pub job_id: String,
    pub status: String,
    pub sub_status: Option<String>,
    pub created: Option<chrono::DateTime<chrono::Utc>>,
    pub function: Option<String>,
    #[serde(default)]
    pub runtime_jobs: Vec<RuntimeJobView>,
}

/// Cached view of a runtime job nested under a serverless job row.
///
/// An empty `status` means no status has been fetched yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeJobView {
    pub runtime_job_id: String,
    pub status: String,
    pub backend: String,
}
