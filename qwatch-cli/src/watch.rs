//! Watch loop orchestration
//!
//! Dispatches to the interactive UI or one of the two non-interactive loops
//! (NDJSON and plain). The non-interactive loops share the fetch/classify
//! plumbing with the UI and run until interrupted, stopping the engine with a
//! bounded join on the way out.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use tracing::{error, info};

use qwatch_client::JobProvider;
use qwatch_core::domain::job::JobRow;
use qwatch_core::status::is_terminal;
use qwatch_engine::WatchState;

use crate::config::{WatchMode, WatchOptions, build_provider};
use crate::render::render_tree_lines;
use crate::tui;

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Run the watch loop until interrupted.
pub async fn run_watch(options: WatchOptions) -> Result<()> {
    match options.mode {
        WatchMode::Json => run_json_watch(options).await,
        WatchMode::Plain => run_plain_watch(options).await,
        WatchMode::Tui => tui::run_tui(options).await,
    }
}

/// Fetch job rows and apply the client-side row filters.
pub(crate) async fn fetch_rows(
    provider: &Arc<dyn JobProvider>,
    options: &WatchOptions,
) -> Result<Vec<JobRow>> {
    let rows = provider
        .list_jobs(&options.list_filter())
        .await
        .context("Failed to fetch serverless jobs")?;
    Ok(apply_row_filters(rows, options))
}

fn apply_row_filters(mut rows: Vec<JobRow>, options: &WatchOptions) -> Vec<JobRow> {
    if let Some(job_id) = &options.job_id {
        rows.retain(|row| &row.job_id == job_id);
    }
    if let Some(function) = &options.function {
        rows.retain(|row| row.function.as_deref() == Some(function.as_str()));
    }
    rows
}

/// Split rows into active (non-terminal) and terminal job id sets.
pub(crate) fn classify_rows(rows: &[JobRow]) -> (Vec<String>, Vec<String>) {
    let mut active = Vec::new();
    let mut terminal = Vec::new();
    for row in rows {
        if is_terminal(&row.status) {
            terminal.push(row.job_id.clone());
        } else {
            active.push(row.job_id.clone());
        }
    }
    (active, terminal)
}

/// One refresh cycle shared by the non-interactive loops.
///
/// A listing failure keeps the previous rows and is retried after one
/// interval; it never stops the loop.
async fn refresh_cycle(
    provider: &Arc<dyn JobProvider>,
    state: &WatchState,
    options: &WatchOptions,
    rows: &mut Vec<JobRow>,
    first_fetch: &mut bool,
) -> Option<String> {
    match fetch_rows(provider, options).await {
        Ok(fetched) => {
            let (active, terminal) = classify_rows(&fetched);
            if *first_fetch {
                state.freeze_initial_terminal_set(&terminal);
                *first_fetch = false;
            }
            state.enqueue_discovery(&active, false);
            state.enqueue_discovery(&terminal, true);
            // Enforce the active-iff-non-terminal rule for jobs that finished
            // mid-session; a no-op for everything else.
            for job_id in &terminal {
                state.mark_job_terminal(job_id);
            }
            *rows = fetched;
            None
        }
        Err(fetch_error) => {
            error!("Job listing failed: {:#}", fetch_error);
            Some(format!("{fetch_error:#}"))
        }
    }
}

async fn run_json_watch(options: WatchOptions) -> Result<()> {
    let provider: Arc<dyn JobProvider> = Arc::new(build_provider(&options));
    let state = WatchState::new(provider.clone(), options.interval);
    state.start();
    info!("Starting NDJSON watch (interval: {:?})", options.interval);

    let mut rows: Vec<JobRow> = Vec::new();
    let mut first_fetch = true;

    loop {
        if let Some(fetch_error) =
            refresh_cycle(&provider, &state, &options, &mut rows, &mut first_fetch).await
        {
            eprintln!("Error: {fetch_error}");
        }

        state.attach_runtime_rows(&mut rows);
        let payload = serde_json::json!({
            "refreshed_at": chrono::Utc::now().to_rfc3339(),
            "rows": rows,
        });
        println!("{payload}");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(options.interval) => {}
        }
    }

    state.stop().await;
    println!("Exiting.");
    Ok(())
}

async fn run_plain_watch(options: WatchOptions) -> Result<()> {
    let provider: Arc<dyn JobProvider> = Arc::new(build_provider(&options));
    let state = WatchState::new(provider.clone(), options.interval);
    state.start();
    info!("Starting plain watch (interval: {:?})", options.interval);

    let mut rows: Vec<JobRow> = Vec::new();
    let mut first_fetch = true;
    let mut cycle = 0usize;
    let mut last_error: Option<String> = None;

    loop {
        if let Some(fetch_error) =
            refresh_cycle(&provider, &state, &options, &mut rows, &mut first_fetch).await
        {
            last_error = Some(fetch_error);
        } else {
            last_error = None;
        }

        state.attach_runtime_rows(&mut rows);

        let height = crossterm::terminal::size()
            .map(|(_, height)| height as usize)
            .unwrap_or(24);
        let line_budget = height.saturating_sub(2).max(3);
        let spinner = SPINNER_FRAMES[cycle % SPINNER_FRAMES.len()];
        let mut lines = render_tree_lines(&rows, options.limit, line_budget, spinner);
        if let Some(fetch_error) = &last_error {
            lines.truncate(line_budget.saturating_sub(1));
            lines.push(format!("Error: {fetch_error}"));
        }

        let mut stdout = std::io::stdout();
        execute!(stdout, MoveTo(0, 0), Clear(ClearType::All))?;
        for line in &lines {
            writeln!(stdout, "{line}")?;
        }
        stdout.flush()?;
        cycle += 1;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(options.interval) => {}
        }
    }

    state.stop().await;
    println!("Exiting.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_options;

    fn row(job_id: &str, status: &str, function: Option<&str>) -> JobRow {
        JobRow {
            job_id: job_id.to_string(),
            status: status.to_string(),
            sub_status: None,
            created: None,
            function: function.map(str::to_string),
            runtime_jobs: Vec::new(),
        }
    }

    #[test]
    fn test_classify_rows_splits_on_terminal_status() {
        let rows = vec![
            row("j1", "RUNNING", None),
            row("j2", "DONE", None),
            row("j3", "QUEUED", None),
        ];
        let (active, terminal) = classify_rows(&rows);
        assert_eq!(active, vec!["j1".to_string(), "j3".to_string()]);
        assert_eq!(terminal, vec!["j2".to_string()]);
    }

    #[test]
    fn test_row_filters_narrow_by_job_id_and_function() {
        let rows = vec![
            row("j1", "RUNNING", Some("acme/sampler")),
            row("j2", "RUNNING", Some("acme/estimator")),
        ];

        let mut options = test_options();
        options.job_id = Some("j1".to_string());
        let filtered = apply_row_filters(rows.clone(), &options);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].job_id, "j1");

        let mut options = test_options();
        options.function = Some("acme/estimator".to_string());
        let filtered = apply_row_filters(rows, &options);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].job_id, "j2");
    }
}
