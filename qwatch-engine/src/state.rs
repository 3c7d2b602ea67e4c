//! Engine facade: shared state plus background worker lifecycle

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use qwatch_client::JobProvider;
use qwatch_core::domain::job::JobRow;

use crate::cache::SharedCache;
use crate::discovery::DiscoveryScheduler;
use crate::lifecycle::LifecycleTracker;
use crate::worker::{self, DISCOVERY_BATCH_SIZE, STOP_JOIN_TIMEOUT};

pub(crate) struct EngineInner {
    pub cache: SharedCache,
    pub scheduler: DiscoveryScheduler,
    pub lifecycle: LifecycleTracker,
}

/// Handle to the shared job state and its background refresh worker.
///
/// Cheap to clone; all clones share the same state. The single mutex is held
/// only for in-memory updates, never across a remote call.
#[derive(Clone)]
pub struct WatchState {
    inner: Arc<Mutex<EngineInner>>,
    provider: Arc<dyn JobProvider>,
    status_interval: Duration,
    token: CancellationToken,
    worker: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl WatchState {
    /// Create a new engine over a provider.
    ///
    /// `status_interval` is clamped to a minimum of one second.
    pub fn new(provider: Arc<dyn JobProvider>, status_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                cache: SharedCache::default(),
                scheduler: DiscoveryScheduler::default(),
                lifecycle: LifecycleTracker::default(),
            })),
            provider,
            status_interval: status_interval.max(Duration::from_secs(1)),
            token: CancellationToken::new(),
            worker: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the background refresh worker.
    pub fn start(&self) {
        let handle = tokio::spawn(worker::run_worker(self.clone()));
        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Stop the background refresh worker.
    ///
    /// Cooperative: the stop signal is observed between ticks, and the join
    /// is bounded. In-flight remote calls are not aborted.
    pub async fn stop(&self) {
        self.token.cancel();
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("Refresh worker did not stop within {:?}", STOP_JOIN_TIMEOUT);
            }
        }
    }

    /// Queue runtime discovery for visible serverless jobs.
    ///
    /// Non-terminal jobs also enter the continuously-polled set; terminal
    /// jobs only get discovery, with status fetches deferred until requested.
    pub fn enqueue_discovery(&self, job_ids: &[String], terminal: bool) {
        let mut inner = self.inner.lock().unwrap();
        for job_id in job_ids {
            inner.cache.ensure_parent(job_id);
            if !terminal {
                inner.lifecycle.set_active(job_id);
            }
            inner.scheduler.enqueue(job_id);
        }
    }

    /// Freeze jobs that were already terminal in the very first listing.
    pub fn freeze_initial_terminal_set(&self, job_ids: &[String]) {
        self.inner
            .lock()
            .unwrap()
            .lifecycle
            .freeze_initial_terminal_set(job_ids);
    }

    /// Stop continuous refresh for a job that transitioned to terminal.
    pub fn mark_job_terminal(&self, job_id: &str) {
        self.inner.lock().unwrap().lifecycle.mark_terminal(job_id);
    }

    /// Request an on-demand status refresh for a job.
    ///
    /// Breaking a freeze for the first time permanently re-enables polling
    /// for the job's already-discovered children.
    pub fn request_status_refresh(&self, job_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let EngineInner {
            cache,
            lifecycle,
            ..
        } = &mut *inner;
        if lifecycle.unfreeze(job_id) {
            let runtime_ids: Vec<String> = cache.runtime_ids(job_id).to_vec();
            for runtime_id in &runtime_ids {
                cache.set_poll_enabled(runtime_id, true);
            }
        }
        lifecycle.request_one_shot(job_id);
    }

    /// Runtime job count for a parent, or None while discovery is pending.
    pub fn runtime_count(&self, job_id: &str) -> Option<usize> {
        let inner = self.inner.lock().unwrap();
        if !inner.scheduler.is_done(job_id) {
            return None;
        }
        Some(inner.cache.runtime_count(job_id))
    }

    /// Merge cached runtime views into output rows.
    ///
    /// The only read path: each row receives a consistent point-in-time copy
    /// of its child list.
    pub fn attach_runtime_rows(&self, rows: &mut [JobRow]) {
        let inner = self.inner.lock().unwrap();
        for row in rows {
            row.runtime_jobs = inner.cache.runtime_views(&row.job_id);
        }
    }

    // =========================================================================
    // Worker-side accessors (lock is taken and released per step)
    // =========================================================================

    pub(crate) fn provider(&self) -> &Arc<dyn JobProvider> {
        &self.provider
    }

    pub(crate) fn status_interval(&self) -> Duration {
        self.status_interval
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Re-enqueue every active job for rediscovery, clearing its done mark.
    pub(crate) fn requeue_active_for_rediscovery(&self) {
        let mut inner = self.inner.lock().unwrap();
        let EngineInner {
            scheduler,
            lifecycle,
            ..
        } = &mut *inner;
        scheduler.requeue(lifecycle.active());
    }

    pub(crate) fn drain_discovery_batch(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .scheduler
            .drain_batch(DISCOVERY_BATCH_SIZE)
    }

    /// Merge a discovery result and mark the job done.
    pub(crate) fn merge_discovered(&self, job_id: &str, runtime_ids: &[String]) {
        let mut inner = self.inner.lock().unwrap();
        let frozen = inner.lifecycle.is_frozen(job_id);
        inner.cache.upsert_runtime_jobs(job_id, runtime_ids, frozen);
        inner.scheduler.mark_done(job_id);
    }

    /// Compute the deduplicated status fetch set for this sweep.
    ///
    /// Union of: children of active parents, any non-terminal poll-enabled
    /// child anywhere, and statusless children of parents with a pending
    /// one-shot request. One-shot markers are cleared here, before any fetch
    /// runs.
    pub(crate) fn collect_fetch_set(&self) -> Vec<String> {
        let mut inner = self.inner.lock().unwrap();
        let one_shot = inner.lifecycle.take_one_shot();
        let EngineInner {
            cache, lifecycle, ..
        } = &*inner;

        let mut fetch_set: HashSet<String> = HashSet::new();

        for job_id in lifecycle.active() {
            for runtime_id in cache.runtime_ids(job_id) {
                if let Some(record) = cache.record(runtime_id) {
                    if !record.terminal && record.poll_enabled {
                        fetch_set.insert(runtime_id.clone());
                    }
                }
            }
        }

        // A still-running child keeps refreshing even after its parent
        // reached a terminal status mid-session.
        for (runtime_id, record) in cache.records() {
            if !record.terminal && record.poll_enabled {
                fetch_set.insert(runtime_id.clone());
            }
        }

        for job_id in &one_shot {
            for runtime_id in cache.runtime_ids(job_id) {
                if let Some(record) = cache.record(runtime_id) {
                    if record.poll_enabled && record.status.is_empty() {
                        fetch_set.insert(runtime_id.clone());
                    }
                }
            }
        }

        fetch_set.into_iter().collect()
    }

    pub(crate) fn apply_runtime_status(&self, runtime_id: &str, status: String, backend: String) {
        self.inner
            .lock()
            .unwrap()
            .cache
            .update_runtime_status(runtime_id, status, backend);
    }

    pub(crate) fn apply_runtime_unavailable(&self, runtime_id: &str, reason: &str) {
        self.inner
            .lock()
            .unwrap()
            .cache
            .mark_unavailable(runtime_id, reason);
    }
}
