//! Incremental tree reconciliation for the jobs view
//!
//! The tree is persistent across refreshes: nodes whose identifiers are still
//! present are relabeled in place, never rebuilt, so expansion state and
//! scroll position survive and the view does not flicker.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use qwatch_core::domain::job::JobRow;
use qwatch_core::status::is_terminal;

/// A runtime job leaf under a job node.
#[derive(Debug, Clone)]
pub struct RuntimeNode {
    pub runtime_job_id: String,
    pub status: String,
    pub backend: String,
}

/// Persistent tree node for one serverless job.
#[derive(Debug)]
pub struct JobNode {
    /// Latest label fields (`runtime_jobs` cleared; children live below).
    pub row: JobRow,
    pub is_terminal: bool,
    pub expanded: bool,
    pub allow_expand: bool,
    /// Discovery has not completed yet for this terminal job.
    pub discovery_pending: bool,
    pub children: Vec<RuntimeNode>,
    /// Last known non-empty child count, bridging transient empty scans.
    remembered_count: usize,
}

impl JobNode {
    pub fn job_id(&self) -> &str {
        &self.row.job_id
    }
}

/// Effects of a reconcile pass, applied by the caller.
#[derive(Debug, Default)]
pub struct ReconcileEffects {
    /// Jobs observed transitioning from non-terminal to terminal.
    pub newly_terminal: Vec<String>,
}

/// Persistent jobs tree, reconciled in place each refresh.
#[derive(Debug, Default)]
pub struct JobTree {
    nodes: HashMap<String, JobNode>,
    order: Vec<String>,
    runtime_status: HashMap<String, String>,
    initial_terminal: HashSet<String>,
}

impl JobTree {
    /// Record the jobs that were terminal in the very first listing.
    ///
    /// These never auto-expand on child status updates.
    pub fn set_initial_terminal(&mut self, job_ids: &[String]) {
        for job_id in job_ids {
            self.initial_terminal.insert(job_id.clone());
        }
    }

    /// Reconcile the tree against the current rows.
    ///
    /// Rows are ordered newest first and truncated to `limit`.
    /// `runtime_count` reports a terminal job's discovered child count, or
    /// None while discovery is still pending.
    pub fn reconcile(
        &mut self,
        rows: &[JobRow],
        limit: usize,
        runtime_count: impl Fn(&str) -> Option<usize>,
    ) -> ReconcileEffects {
        let mut rows_sorted: Vec<&JobRow> = rows.iter().collect();
        rows_sorted.sort_by(|a, b| b.created.cmp(&a.created));
        rows_sorted.truncate(limit.max(1));

        let current_ids: HashSet<&str> = rows_sorted.iter().map(|row| row.job_id.as_str()).collect();
        self.nodes.retain(|job_id, _| current_ids.contains(job_id.as_str()));

        let mut effects = ReconcileEffects::default();
        let mut visible_runtime_ids: HashSet<String> = HashSet::new();
        let mut order = Vec::with_capacity(rows_sorted.len());

        for row in rows_sorted {
            order.push(row.job_id.clone());
            let terminal_now = is_terminal(&row.status);
            let count = if terminal_now {
                runtime_count(&row.job_id)
            } else {
                None
            };

            let mut label_row = row.clone();
            label_row.runtime_jobs = Vec::new();

            let node = match self.nodes.entry(row.job_id.clone()) {
                Entry::Occupied(entry) => {
                    let node = entry.into_mut();
                    if terminal_now && !node.is_terminal {
                        effects.newly_terminal.push(row.job_id.clone());
                    }
                    node.is_terminal = terminal_now;
                    node.row = label_row;
                    if terminal_now {
                        node.discovery_pending = count.is_none();
                        if let Some(count) = count {
                            node.allow_expand = count > 0;
                        }
                    } else {
                        node.discovery_pending = false;
                    }
                    node
                }
                Entry::Vacant(entry) => entry.insert(JobNode {
                    row: label_row,
                    is_terminal: terminal_now,
                    // Non-terminal jobs open pre-expanded and always stay
                    // expandable: discovery may still be pending.
                    expanded: !terminal_now,
                    allow_expand: if terminal_now {
                        count.is_some_and(|count| count > 0)
                    } else {
                        true
                    },
                    discovery_pending: terminal_now && count.is_none(),
                    children: Vec::new(),
                    remembered_count: 0,
                }),
            };

            let runtimes = &row.runtime_jobs;
            let current_count = runtimes.len();
            let previous_count = node.remembered_count;
            // Keep already discovered children when a lazy scan transiently
            // comes back short: terminal parents always, any parent whose
            // non-zero count momentarily reports zero.
            let preserve_children =
                (terminal_now && previous_count > 0) || (current_count == 0 && previous_count > 0);

            if current_count > 0 {
                node.allow_expand = true;
            }
            if !terminal_now && current_count > previous_count && current_count > 0 {
                node.expanded = true;
            }
            node.remembered_count = if preserve_children {
                previous_count.max(current_count)
            } else {
                current_count
            };

            let current_runtime_ids: HashSet<&str> = runtimes
                .iter()
                .map(|rt| rt.runtime_job_id.as_str())
                .collect();
            if !preserve_children {
                node.children
                    .retain(|child| current_runtime_ids.contains(child.runtime_job_id.as_str()));
            } else {
                visible_runtime_ids.extend(node.children.iter().map(|c| c.runtime_job_id.clone()));
            }

            let mut expand_on_change = false;
            for runtime in runtimes {
                visible_runtime_ids.insert(runtime.runtime_job_id.clone());
                let status_changed = self
                    .runtime_status
                    .get(&runtime.runtime_job_id)
                    .is_some_and(|previous| previous != &runtime.status);
                self.runtime_status
                    .insert(runtime.runtime_job_id.clone(), runtime.status.clone());

                match node
                    .children
                    .iter_mut()
                    .find(|child| child.runtime_job_id == runtime.runtime_job_id)
                {
                    Some(child) => {
                        child.status = runtime.status.clone();
                        child.backend = runtime.backend.clone();
                    }
                    None => node.children.push(RuntimeNode {
                        runtime_job_id: runtime.runtime_job_id.clone(),
                        status: runtime.status.clone(),
                        backend: runtime.backend.clone(),
                    }),
                }

                if status_changed {
                    expand_on_change = true;
                }
            }
            // A status value change pops the parent open, except for jobs
            // that were already terminal in the initial snapshot.
            if expand_on_change && !self.initial_terminal.contains(&row.job_id) {
                node.expanded = true;
            }
        }

        self.order = order;
        self.runtime_status
            .retain(|runtime_id, _| visible_runtime_ids.contains(runtime_id));
        effects
    }

    /// Toggle a job node's expansion.
    ///
    /// Returns the new state, or None when the node does not exist or cannot
    /// expand.
    pub fn toggle(&mut self, job_id: &str) -> Option<bool> {
        let node = self.nodes.get_mut(job_id)?;
        if !node.expanded && !node.allow_expand {
            return None;
        }
        node.expanded = !node.expanded;
        Some(node.expanded)
    }

    /// Look up a node by job id.
    pub fn get(&self, job_id: &str) -> Option<&JobNode> {
        self.nodes.get(job_id)
    }

    /// Nodes in render order (newest first).
    pub fn iter(&self) -> impl Iterator<Item = &JobNode> {
        self.order.iter().filter_map(|job_id| self.nodes.get(job_id))
    }
}
