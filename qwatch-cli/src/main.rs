//! qwatch CLI
//!
//! Terminal console for watching serverless and runtime job statuses.
//!
//! Architecture:
//! - Configuration: CLI flags with environment fallbacks
//! - Clients: HTTP adapters for the gateway and runtime services
//! - Engine: background discovery and status refresh over a shared cache
//! - Views: interactive TUI, plain line-budgeted tree, NDJSON stream

mod config;
mod render;
mod tree;
mod tui;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Cli, WatchMode, WatchOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let options = Cli::parse().into_options();

    if options.no_color {
        colored::control::set_override(false);
    }
    init_logging(&options)?;

    watch::run_watch(options).await
}

fn init_logging(options: &WatchOptions) -> Result<()> {
    if options.verbose {
        let state_dir = log_dir();
        std::fs::create_dir_all(&state_dir)
            .with_context(|| format!("Failed to create log directory {}", state_dir.display()))?;
        let log_path = state_dir.join("debug.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    "qwatch_cli=debug,qwatch_engine=debug,qwatch_client=debug".into()
                }),
            )
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else if options.mode != WatchMode::Tui {
        // The TUI owns the terminal; without --verbose its logs are dropped.
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    "qwatch_cli=info,qwatch_engine=info,qwatch_client=info".into()
                }),
            )
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

fn log_dir() -> std::path::PathBuf {
    if let Some(state) = std::env::var_os("XDG_STATE_HOME") {
        std::path::PathBuf::from(state).join("qwatch")
    } else if let Some(home) = std::env::var_os("HOME") {
        std::path::PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("qwatch")
    } else {
        std::env::temp_dir().join("qwatch")
    }
}
