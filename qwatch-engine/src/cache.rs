//! Shared cache of discovered runtime jobs and their statuses

use std::collections::HashMap;

use qwatch_core::domain::job::{RuntimeJobView, UNKNOWN_BACKEND};
use qwatch_core::status::is_terminal;

/// Cached state of a single runtime job.
#[derive(Debug, Clone)]
pub struct RuntimeRecord {
    /// Latest fetched status; empty until the first fetch completes.
    pub status: String,
    pub backend: String,
    pub terminal: bool,
    /// False while the parent is frozen and the job has not been
    /// individually requested.
    pub poll_enabled: bool,
}

impl RuntimeRecord {
    fn new(poll_enabled: bool) -> Self {
        Self {
            status: String::new(),
            backend: UNKNOWN_BACKEND.to_string(),
            terminal: false,
            poll_enabled,
        }
    }
}

/// Parent→children index plus per-runtime-job records.
///
/// Single source of truth read by renderers and written by the worker.
/// Methods are plain in-memory updates; serialization happens at the engine
/// lock, which is never held across a remote call.
#[derive(Debug, Default)]
pub struct SharedCache {
    index: HashMap<String, Vec<String>>,
    records: HashMap<String, RuntimeRecord>,
}

impl SharedCache {
    /// Make sure a parent has an (possibly empty) child list.
    pub fn ensure_parent(&mut self, job_id: &str) {
        self.index.entry(job_id.to_string()).or_default();
    }

    /// Merge newly discovered runtime ids into a parent's child list.
    ///
    /// Idempotent: preserves existing order and skips duplicates. Genuinely
    /// new ids get a record whose poll flag follows the parent's frozen
    /// state; ids already known while the parent is frozen are forced off,
    /// since rediscovery can surface old ids after a freeze.
    pub fn upsert_runtime_jobs(&mut self, job_id: &str, discovered: &[String], parent_frozen: bool) {
        let ids = self.index.entry(job_id.to_string()).or_default();
        for runtime_id in discovered {
            if !ids.contains(runtime_id) {
                ids.push(runtime_id.clone());
            }
            match self.records.get_mut(runtime_id) {
                None => {
                    self.records
                        .insert(runtime_id.clone(), RuntimeRecord::new(!parent_frozen));
                }
                Some(record) if parent_frozen => record.poll_enabled = false,
                Some(_) => {}
            }
        }
    }

    /// Write a fetched status through to a runtime job's record.
    pub fn update_runtime_status(&mut self, runtime_id: &str, status: String, backend: String) {
        if let Some(record) = self.records.get_mut(runtime_id) {
            record.terminal = is_terminal(&status);
            record.status = status;
            record.backend = backend;
        }
    }

    /// Record a failed status fetch.
    ///
    /// The previously known backend and terminal flag are kept, so a job that
    /// was still eligible for polling keeps being retried.
    pub fn mark_unavailable(&mut self, runtime_id: &str, reason: &str) {
        if let Some(record) = self.records.get_mut(runtime_id) {
            record.status = format!("UNAVAILABLE: {reason}");
        }
    }

    /// Enable or disable polling for a runtime job.
    pub fn set_poll_enabled(&mut self, runtime_id: &str, enabled: bool) {
        if let Some(record) = self.records.get_mut(runtime_id) {
            record.poll_enabled = enabled;
        }
    }

    /// Runtime ids discovered for a parent, in discovery order.
    pub fn runtime_ids(&self, job_id: &str) -> &[String] {
        self.index.get(job_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of runtime jobs discovered for a parent.
    pub fn runtime_count(&self, job_id: &str) -> usize {
        self.runtime_ids(job_id).len()
    }

    /// Look up a runtime job's record.
    pub fn record(&self, runtime_id: &str) -> Option<&RuntimeRecord> {
        self.records.get(runtime_id)
    }

    /// Iterate over every known runtime record.
    pub fn records(&self) -> impl Iterator<Item = (&String, &RuntimeRecord)> {
        self.records.iter()
    }

    /// Point-in-time child views for one parent, in discovery order.
    ///
    /// Only ids present in the parent's discovered list are returned.
    pub fn runtime_views(&self, job_id: &str) -> Vec<RuntimeJobView> {
        self.runtime_ids(job_id)
            .iter()
            .map(|runtime_id| {
                let record = self.records.get(runtime_id);
                RuntimeJobView {
                    runtime_job_id: runtime_id.clone(),
                    status: record.map(|r| r.status.clone()).unwrap_or_default(),
                    backend: record
                        .map(|r| r.backend.clone())
                        .unwrap_or_else(|| UNKNOWN_BACKEND.to_string()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_upsert_is_idempotent_and_order_preserving() {
        let mut cache = SharedCache::default();
        cache.upsert_runtime_jobs("j1", &ids(&["r1", "r2"]), false);
        cache.upsert_runtime_jobs("j1", &ids(&["r2", "r3", "r1"]), false);

        assert_eq!(cache.runtime_ids("j1"), ids(&["r1", "r2", "r3"]).as_slice());
        assert!(cache.record("r1").unwrap().poll_enabled);
    }

    #[test]
    fn test_upsert_under_frozen_parent_disables_polling() {
        let mut cache = SharedCache::default();
        cache.upsert_runtime_jobs("j1", &ids(&["r1"]), true);
        assert!(!cache.record("r1").unwrap().poll_enabled);

        // Rediscovery surfacing a known id after a freeze forces the flag off
        // even if something re-enabled it in between.
        cache.set_poll_enabled("r1", true);
        cache.upsert_runtime_jobs("j1", &ids(&["r1"]), true);
        assert!(!cache.record("r1").unwrap().poll_enabled);
    }

    #[test]
    fn test_update_status_recomputes_terminal_flag() {
        let mut cache = SharedCache::default();
        cache.upsert_runtime_jobs("j1", &ids(&["r1"]), false);

        cache.update_runtime_status("r1", "RUNNING".to_string(), "backend_a".to_string());
        assert!(!cache.record("r1").unwrap().terminal);

        cache.update_runtime_status("r1", "DONE".to_string(), "backend_a".to_string());
        assert!(cache.record("r1").unwrap().terminal);
    }

    #[test]
    fn test_mark_unavailable_keeps_backend_and_terminal_flag() {
        let mut cache = SharedCache::default();
        cache.upsert_runtime_jobs("j1", &ids(&["r1"]), false);
        cache.update_runtime_status("r1", "RUNNING".to_string(), "backend_a".to_string());

        cache.mark_unavailable("r1", "connection reset");
        let record = cache.record("r1").unwrap();
        assert_eq!(record.status, "UNAVAILABLE: connection reset");
        assert_eq!(record.backend, "backend_a");
        assert!(!record.terminal);
    }

    #[test]
    fn test_views_only_cover_discovered_ids() {
        let mut cache = SharedCache::default();
        cache.upsert_runtime_jobs("j1", &ids(&["r1"]), false);
        cache.upsert_runtime_jobs("j2", &ids(&["r2"]), false);

        let views = cache.runtime_views("j1");
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].runtime_job_id, "r1");
        assert_eq!(views[0].status, "");
        assert_eq!(views[0].backend, UNKNOWN_BACKEND);

        assert!(cache.runtime_views("j3").is_empty());
    }
}
