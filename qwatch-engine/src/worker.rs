//! Background refresh worker
//!
//! One task runs discovery batches and status refresh sequentially per tick,
//! so the two kinds of work share an execution context and never race each
//! other. Two independent timers gate them: the configurable status-refresh
//! interval and the fixed rediscovery interval. The batch drain runs on every
//! tick, so discovery is never starved by a slow status interval.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::state::WatchState;

pub(crate) const DISCOVERY_BATCH_SIZE: usize = 3;
pub(crate) const WORKER_TICK: Duration = Duration::from_millis(200);
pub(crate) const REDISCOVERY_INTERVAL: Duration = Duration::from_secs(5);
pub(crate) const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) async fn run_worker(state: WatchState) {
    debug!(
        "Starting refresh worker (status interval: {:?})",
        state.status_interval()
    );

    let mut next_status_refresh = Instant::now();
    let mut next_rediscovery = Instant::now();

    loop {
        if state.token().is_cancelled() {
            break;
        }

        let now = Instant::now();

        // Active jobs can grow new runtime jobs at any time; re-queue them
        // periodically so those are picked up without waiting for idleness.
        if now >= next_rediscovery {
            state.requeue_active_for_rediscovery();
            next_rediscovery = now + REDISCOVERY_INTERVAL;
        }

        discover_batch(&state).await;

        if now >= next_status_refresh {
            refresh_runtime_statuses(&state).await;
            next_status_refresh = now + state.status_interval();
        }

        tokio::select! {
            _ = state.token().cancelled() => break,
            _ = tokio::time::sleep(WORKER_TICK) => {}
        }
    }

    debug!("Refresh worker stopped");
}

/// Drain one discovery batch against the provider.
///
/// A failed discovery counts as "no children found this round": the job is
/// still marked done and is only retried through the rediscovery path.
pub(crate) async fn discover_batch(state: &WatchState) {
    let batch = state.drain_discovery_batch();

    for job_id in batch {
        let runtime_ids = match state.provider().runtime_job_ids(&job_id).await {
            Ok(runtime_ids) => runtime_ids,
            Err(error) => {
                debug!("Runtime discovery failed for job {}: {}", job_id, error);
                Vec::new()
            }
        };
        state.merge_discovered(&job_id, &runtime_ids);
    }
}

/// Run one status sweep over the current fetch set.
pub(crate) async fn refresh_runtime_statuses(state: &WatchState) {
    let runtime_ids = state.collect_fetch_set();

    for runtime_id in runtime_ids {
        match state.provider().runtime_job_status(&runtime_id).await {
            Ok(status) => {
                state.apply_runtime_status(&runtime_id, status.status, status.backend);
            }
            Err(error) => {
                warn!("Status fetch failed for runtime job {}: {}", runtime_id, error);
                state.apply_runtime_unavailable(&runtime_id, &error.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use qwatch_client::{ClientError, JobProvider, ListJobsFilter, RuntimeStatus};
    use qwatch_core::domain::job::JobRow;

    use crate::state::WatchState;

    /// Scripted provider: per-job runtime ids, per-runtime status sequences.
    #[derive(Default)]
    struct MockProvider {
        runtime_ids: Mutex<HashMap<String, Vec<String>>>,
        // Statuses are popped front-first; the last entry repeats.
        statuses: Mutex<HashMap<String, Vec<RuntimeStatus>>>,
        fail_discovery: Mutex<bool>,
        fail_status: Mutex<bool>,
        discovery_calls: Mutex<Vec<String>>,
        status_calls: Mutex<Vec<String>>,
    }

    impl MockProvider {
        fn set_runtime_ids(&self, job_id: &str, ids: &[&str]) {
            self.runtime_ids
                .lock()
                .unwrap()
                .insert(job_id.to_string(), ids.iter().map(|s| s.to_string()).collect());
        }

        fn push_status(&self, runtime_id: &str, status: &str, backend: &str) {
            self.statuses
                .lock()
                .unwrap()
                .entry(runtime_id.to_string())
                .or_default()
                .push(RuntimeStatus {
                    status: status.to_string(),
                    backend: backend.to_string(),
                });
        }

        fn discovery_calls(&self) -> Vec<String> {
            self.discovery_calls.lock().unwrap().clone()
        }

        fn status_calls(&self) -> Vec<String> {
            self.status_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobProvider for MockProvider {
        async fn list_jobs(&self, _filter: &ListJobsFilter) -> qwatch_client::Result<Vec<JobRow>> {
            Ok(Vec::new())
        }

        async fn runtime_job_ids(&self, job_id: &str) -> qwatch_client::Result<Vec<String>> {
            self.discovery_calls.lock().unwrap().push(job_id.to_string());
            if *self.fail_discovery.lock().unwrap() {
                return Err(ClientError::api_error(500, "discovery unavailable"));
            }
            Ok(self
                .runtime_ids
                .lock()
                .unwrap()
                .get(job_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn runtime_job_status(&self, runtime_job_id: &str) -> qwatch_client::Result<RuntimeStatus> {
            self.status_calls.lock().unwrap().push(runtime_job_id.to_string());
            if *self.fail_status.lock().unwrap() {
                return Err(ClientError::api_error(500, "status unavailable"));
            }
            let mut statuses = self.statuses.lock().unwrap();
            let sequence = statuses
                .get_mut(runtime_job_id)
                .ok_or_else(|| ClientError::api_error(404, "unknown runtime job"))?;
            if sequence.len() > 1 {
                Ok(sequence.remove(0))
            } else {
                Ok(sequence[0].clone())
            }
        }

        async fn stop_job(&self, _job_id: &str) -> qwatch_client::Result<()> {
            Ok(())
        }

        async fn cancel_runtime_job(&self, _runtime_job_id: &str) -> qwatch_client::Result<()> {
            Ok(())
        }

        async fn job_logs(&self, _job_id: &str) -> qwatch_client::Result<String> {
            Ok(String::new())
        }
    }

    fn engine() -> (WatchState, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::default());
        let state = WatchState::new(provider.clone(), Duration::from_secs(1));
        (state, provider)
    }

    fn row(state: &WatchState, job_id: &str) -> JobRow {
        let mut rows = vec![JobRow {
            job_id: job_id.to_string(),
            status: String::new(),
            sub_status: None,
            created: None,
            function: None,
            runtime_jobs: Vec::new(),
        }];
        state.attach_runtime_rows(&mut rows);
        rows.remove(0)
    }

    #[tokio::test]
    async fn test_double_enqueue_discovers_once() {
        let (state, provider) = engine();
        provider.set_runtime_ids("j1", &["r1"]);

        state.enqueue_discovery(&["j1".to_string()], false);
        state.enqueue_discovery(&["j1".to_string()], false);
        discover_batch(&state).await;
        discover_batch(&state).await;

        assert_eq!(provider.discovery_calls(), vec!["j1".to_string()]);
        assert_eq!(state.runtime_count("j1"), Some(1));
    }

    #[tokio::test]
    async fn test_frozen_job_receives_no_status_fetches_until_expanded() {
        let (state, provider) = engine();
        provider.set_runtime_ids("j2", &["r2", "r3"]);
        provider.push_status("r2", "DONE", "backend_a");
        provider.push_status("r3", "DONE", "backend_a");

        state.freeze_initial_terminal_set(&["j2".to_string()]);
        state.enqueue_discovery(&["j2".to_string()], true);
        discover_batch(&state).await;

        refresh_runtime_statuses(&state).await;
        assert!(provider.status_calls().is_empty());

        // User expands: exactly one fetch per statusless child, and polling
        // stays enabled afterwards.
        state.request_status_refresh("j2");
        refresh_runtime_statuses(&state).await;
        let mut calls = provider.status_calls();
        calls.sort();
        assert_eq!(calls, vec!["r2".to_string(), "r3".to_string()]);

        let attached = row(&state, "j2");
        assert!(attached.runtime_jobs.iter().all(|rt| rt.status == "DONE"));

        // Terminal now, so the next sweep fetches nothing more.
        refresh_runtime_statuses(&state).await;
        assert_eq!(provider.status_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_active_job_lifecycle_to_terminal() {
        let (state, provider) = engine();
        provider.set_runtime_ids("j1", &["r1"]);
        provider.push_status("r1", "QUEUED", "(unknown)");
        provider.push_status("r1", "RUNNING", "backend_a");
        provider.push_status("r1", "DONE", "backend_a");

        state.enqueue_discovery(&["j1".to_string()], false);
        discover_batch(&state).await;

        refresh_runtime_statuses(&state).await;
        assert_eq!(row(&state, "j1").runtime_jobs[0].status, "QUEUED");
        refresh_runtime_statuses(&state).await;
        assert_eq!(row(&state, "j1").runtime_jobs[0].status, "RUNNING");
        refresh_runtime_statuses(&state).await;
        assert_eq!(row(&state, "j1").runtime_jobs[0].status, "DONE");

        // Parent reports DONE later: removed from the continuous set, not
        // frozen; the child stays visible with its final status.
        state.mark_job_terminal("j1");
        refresh_runtime_statuses(&state).await;
        assert_eq!(provider.status_calls().len(), 3);
        let attached = row(&state, "j1");
        assert_eq!(attached.runtime_jobs[0].status, "DONE");
        assert_eq!(attached.runtime_jobs[0].backend, "backend_a");
    }

    #[tokio::test]
    async fn test_running_child_outlives_terminal_parent() {
        let (state, provider) = engine();
        provider.set_runtime_ids("j1", &["r1"]);
        provider.push_status("r1", "RUNNING", "backend_a");

        state.enqueue_discovery(&["j1".to_string()], false);
        discover_batch(&state).await;
        refresh_runtime_statuses(&state).await;

        state.mark_job_terminal("j1");
        refresh_runtime_statuses(&state).await;

        // Still fetched: the child itself is non-terminal and poll-enabled.
        assert_eq!(provider.status_calls(), vec!["r1".to_string(), "r1".to_string()]);
    }

    #[tokio::test]
    async fn test_rediscovery_surfaces_new_children_without_duplicates() {
        let (state, provider) = engine();
        provider.set_runtime_ids("j1", &["r1"]);

        state.enqueue_discovery(&["j1".to_string()], false);
        discover_batch(&state).await;
        assert_eq!(state.runtime_count("j1"), Some(1));

        provider.set_runtime_ids("j1", &["r1", "r2"]);
        state.requeue_active_for_rediscovery();
        discover_batch(&state).await;

        let attached = row(&state, "j1");
        let ids: Vec<&str> = attached
            .runtime_jobs
            .iter()
            .map(|rt| rt.runtime_job_id.as_str())
            .collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_discovery_failure_counts_as_empty_and_is_done() {
        let (state, provider) = engine();
        *provider.fail_discovery.lock().unwrap() = true;

        state.enqueue_discovery(&["j1".to_string()], true);
        assert_eq!(state.runtime_count("j1"), None);
        discover_batch(&state).await;

        assert_eq!(state.runtime_count("j1"), Some(0));
        // Not retried: a frozen job is never re-queued.
        discover_batch(&state).await;
        assert_eq!(provider.discovery_calls(), vec!["j1".to_string()]);
    }

    #[tokio::test]
    async fn test_status_failure_writes_sentinel_and_retries() {
        let (state, provider) = engine();
        provider.set_runtime_ids("j1", &["r1"]);
        provider.push_status("r1", "RUNNING", "backend_a");

        state.enqueue_discovery(&["j1".to_string()], false);
        discover_batch(&state).await;
        refresh_runtime_statuses(&state).await;

        *provider.fail_status.lock().unwrap() = true;
        refresh_runtime_statuses(&state).await;
        let attached = row(&state, "j1");
        assert!(attached.runtime_jobs[0].status.starts_with("UNAVAILABLE:"));
        assert_eq!(attached.runtime_jobs[0].backend, "backend_a");

        // Still eligible, so the next sweep tries again.
        *provider.fail_status.lock().unwrap() = false;
        refresh_runtime_statuses(&state).await;
        assert_eq!(provider.status_calls().len(), 3);
        assert_eq!(row(&state, "j1").runtime_jobs[0].status, "RUNNING");
    }

    #[tokio::test]
    async fn test_one_shot_markers_clear_even_when_fetch_fails() {
        let (state, provider) = engine();
        provider.set_runtime_ids("j2", &["r2"]);
        *provider.fail_status.lock().unwrap() = true;

        state.freeze_initial_terminal_set(&["j2".to_string()]);
        state.enqueue_discovery(&["j2".to_string()], true);
        discover_batch(&state).await;

        state.request_status_refresh("j2");
        refresh_runtime_statuses(&state).await;
        assert_eq!(provider.status_calls().len(), 1);

        // The marker was consumed; further fetches come from the unfrozen
        // child being poll-enabled and non-terminal, not from the one-shot.
        refresh_runtime_statuses(&state).await;
        assert_eq!(provider.status_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_worker_stops_on_cancel() {
        let (state, _provider) = engine();
        state.start();
        state.stop().await;
    }
}
