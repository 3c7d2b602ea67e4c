//! CLI options and client construction

use std::time::Duration;

use clap::Parser;

use qwatch_client::{CloudProvider, GatewayClient, ListJobsFilter, RuntimeClient};

pub const DEFAULT_GATEWAY_URL: &str = "https://serverless.quantum.example.com";
pub const DEFAULT_RUNTIME_URL: &str = "https://runtime.quantum.example.com";

#[derive(Parser)]
#[command(name = "qwatch")]
#[command(about = "Watch serverless and runtime job statuses in a refreshing terminal view", long_about = None)]
pub struct Cli {
    /// Serverless gateway URL
    #[arg(long, env = "QWATCH_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway_url: String,

    /// Runtime service URL
    #[arg(long, env = "QWATCH_RUNTIME_URL", default_value = DEFAULT_RUNTIME_URL)]
    pub runtime_url: String,

    /// API token used for both services
    #[arg(long, env = "QWATCH_TOKEN")]
    pub token: String,

    /// Service instance identifier
    #[arg(long, env = "QWATCH_INSTANCE")]
    pub instance: Option<String>,

    /// Filter output to a single serverless job id
    #[arg(long)]
    pub job_id: Option<String>,

    /// Function title filter
    #[arg(long)]
    pub function: Option<String>,

    /// Repeatable status filter (e.g. --status RUNNING --status QUEUED)
    #[arg(long)]
    pub status: Vec<String>,

    /// Show jobs created in the last N hours (0 disables the cutoff)
    #[arg(long, default_value_t = 2.0)]
    pub last_hours: f64,

    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Refresh interval in seconds
    #[arg(long, default_value_t = 1)]
    pub interval: u64,

    /// Print newline-delimited JSON instead of the interactive view
    #[arg(long)]
    pub json: bool,

    /// Redraw a static tree in place instead of the interactive view
    #[arg(long)]
    pub plain: bool,

    /// Disable ANSI colors
    #[arg(long)]
    pub no_color: bool,

    /// Write debug logs to a file
    #[arg(long)]
    pub verbose: bool,
}

/// Output mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Tui,
    Plain,
    Json,
}

/// Resolved watch options.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub gateway_url: String,
    pub runtime_url: String,
    pub token: String,
    pub instance: Option<String>,
    pub job_id: Option<String>,
    pub function: Option<String>,
    pub statuses: Option<Vec<String>>,
    pub last_hours: f64,
    pub limit: usize,
    pub offset: usize,
    pub interval: Duration,
    pub mode: WatchMode,
    pub no_color: bool,
    pub verbose: bool,
}

impl Cli {
    pub fn into_options(self) -> WatchOptions {
        let mode = if self.json {
            WatchMode::Json
        } else if self.plain {
            WatchMode::Plain
        } else {
            WatchMode::Tui
        };
        WatchOptions {
            gateway_url: self.gateway_url,
            runtime_url: self.runtime_url,
            token: self.token,
            instance: self.instance,
            job_id: self.job_id,
            function: self.function,
            statuses: if self.status.is_empty() {
                None
            } else {
                Some(self.status)
            },
            last_hours: self.last_hours,
            limit: self.limit.max(1),
            offset: self.offset,
            interval: Duration::from_secs(self.interval.max(1)),
            mode,
            no_color: self.no_color,
            verbose: self.verbose,
        }
    }
}

impl WatchOptions {
    /// Listing filter sent to the provider.
    pub fn list_filter(&self) -> ListJobsFilter {
        let created_after = (self.last_hours > 0.0).then(|| {
            chrono::Utc::now() - chrono::Duration::seconds((self.last_hours * 3600.0) as i64)
        });
        ListJobsFilter {
            statuses: self.statuses.clone(),
            created_after,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Construct the provider from resolved options.
pub fn build_provider(options: &WatchOptions) -> CloudProvider {
    let gateway = GatewayClient::new(
        &options.gateway_url,
        &options.token,
        options.instance.clone(),
    );
    let runtime = RuntimeClient::new(&options.runtime_url, &options.token);
    CloudProvider::new(gateway, runtime)
}

#[cfg(test)]
pub(crate) fn test_options() -> WatchOptions {
    WatchOptions {
        gateway_url: DEFAULT_GATEWAY_URL.to_string(),
        runtime_url: DEFAULT_RUNTIME_URL.to_string(),
        token: "test-token".to_string(),
        instance: None,
        job_id: None,
        function: None,
        statuses: None,
        last_hours: 2.0,
        limit: 50,
        offset: 0,
        interval: Duration::from_secs(1),
        mode: WatchMode::Json,
        no_color: true,
        verbose: false,
    }
}
