//! qwatch HTTP clients
//!
//! Type-safe HTTP clients for the two remote services the console consumes:
//! the serverless gateway (job listings, runtime discovery, logs, stop) and
//! the runtime service (per-job status, cancel).
//!
//! The engine never touches these clients directly; it depends on the narrow
//! [`JobProvider`] trait, implemented here by [`CloudProvider`].
//!
//! # Example
//!
//! ```no_run
//! use qwatch_client::{CloudProvider, GatewayClient, JobProvider, ListJobsFilter, RuntimeClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), qwatch_client::ClientError> {
//!     let gateway = GatewayClient::new("https://gateway.example.com", "token", None);
//!     let runtime = RuntimeClient::new("https://runtime.example.com", "token");
//!     let provider = CloudProvider::new(gateway, runtime);
//!
//!     let rows = provider.list_jobs(&ListJobsFilter { limit: 10, ..Default::default() }).await?;
//!     println!("{} jobs", rows.len());
//!     Ok(())
//! }
//! ```

pub mod error;
mod gateway;
mod provider;
mod runtime;

pub use error::{ClientError, Result};
pub use gateway::GatewayClient;
pub use provider::{CloudProvider, JobProvider, ListJobsFilter, RuntimeStatus};
pub use runtime::RuntimeClient;
