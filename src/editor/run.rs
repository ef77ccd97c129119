//! Tracking of the current run and projection of its status onto the graph.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::{
    editor::{Editor, activity::detect_active_nodes},
    graph::{ExecutionStatus, Graph, NodeId},
    model::{ExecutionRun, RunId, RunStatus},
};

/// The run the editor is currently watching.
#[derive(Debug, Clone, PartialEq)]
pub struct RunTracker {
    pub run_id: RunId,
    pub status: RunStatus,
    /// sequence number of the last applied poll response
    pub last_seq: u64,
    /// poll responses received so far, successful or not
    pub polls: u32,
    /// consecutive failed polls
    pub failures: u32,
}

impl RunTracker {
    fn new(run: &ExecutionRun) -> Self {
        Self {
            run_id: run.id.clone(),
            status: run.status,
            last_seq: 0,
            polls: 0,
            failures: 0,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// A poll response for a given run, numbered by the poller.
#[derive(Debug, Clone)]
pub struct RunUpdate {
    pub run_id: RunId,
    pub seq: u64,
    pub run: ExecutionRun,
}

/// What applying a poll response did.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusApplied {
    /// The response belongs to a superseded run or is older than the last one applied.
    Stale,
    /// The run is still going; these nodes are active.
    Running(BTreeSet<NodeId>),
    /// The run reached a terminal status.
    Finished(RunStatus),
}

impl Editor {
    /// Track `run` as the current run, replacing any previous one.
    ///
    /// Statuses left over from an earlier run are reset to idle.
    pub fn begin_run(
        &mut self,
        run: &ExecutionRun,
    ) {
        if let Some(prev) = &self.run {
            if prev.run_id != run.id {
                info!(previous = %prev.run_id, run = %run.id, "replacing tracked run");
            }
        }

        for node in self.graph.nodes.iter_mut() {
            node.status = ExecutionStatus::Idle;
        }
        for edge in self.graph.edges.iter_mut() {
            edge.animated = false;
        }
        if run.status.is_terminal() {
            project_terminal(&mut self.graph, run.status);
        }

        self.run = Some(RunTracker::new(run));
        self.touch();
    }

    /// Fold a poll response into node statuses and edge animation.
    pub fn apply_run_status(
        &mut self,
        update: &RunUpdate,
    ) -> StatusApplied {
        let Some(tracker) = self.run.as_mut() else {
            debug!(run = %update.run_id, "no tracked run, response dropped");
            return StatusApplied::Stale;
        };
        if tracker.run_id != update.run_id || update.seq <= tracker.last_seq || !tracker.is_in_flight() {
            debug!(run = %update.run_id, seq = update.seq, last_seq = tracker.last_seq, "stale run status dropped");
            return StatusApplied::Stale;
        }

        tracker.last_seq = update.seq;
        tracker.polls += 1;
        tracker.failures = 0;
        tracker.status = update.run.status;

        let applied = match update.run.status {
            RunStatus::Running => {
                let active = detect_active_nodes(&update.run.log, &self.agents, &self.tasks, self.log_window);
                project_active(&mut self.graph, &active);
                StatusApplied::Running(active)
            }
            status => {
                project_terminal(&mut self.graph, status);
                info!(run = %update.run_id, status = status.as_ref(), "run finished");
                StatusApplied::Finished(status)
            }
        };
        self.touch();
        applied
    }

    /// Count a failed poll of `run_id`. Node statuses are left untouched.
    ///
    /// Returns the number of consecutive failures, or `None` for a run that is
    /// no longer tracked.
    pub fn record_poll_failure(
        &mut self,
        run_id: &str,
    ) -> Option<u32> {
        let tracker = self.run.as_mut().filter(|t| t.run_id == run_id && t.is_in_flight())?;
        tracker.polls += 1;
        tracker.failures += 1;
        Some(tracker.failures)
    }

    /// Stop tracking the current run, keeping the last known statuses.
    pub fn detach_run(&mut self) -> Option<RunTracker> {
        let tracker = self.run.take();
        if tracker.is_some() {
            self.touch();
        }
        tracker
    }

    pub fn current_run(&self) -> Option<&RunTracker> {
        self.run.as_ref()
    }
}

/// Mark `active` nodes running; other nodes go idle unless a previous tick
/// already settled them. Edges animate when both endpoints are active.
pub(crate) fn project_active(
    graph: &mut Graph,
    active: &BTreeSet<NodeId>,
) {
    for node in graph.nodes.iter_mut() {
        if active.contains(&node.id) {
            node.status = ExecutionStatus::Running;
        } else if !node.status.is_terminal() {
            node.status = ExecutionStatus::Idle;
        }
    }
    for edge in graph.edges.iter_mut() {
        edge.animated = active.contains(&edge.source) && active.contains(&edge.target);
    }
}

/// Settle every running node on the terminal `status` and stop all animation.
pub(crate) fn project_terminal(
    graph: &mut Graph,
    status: RunStatus,
) {
    let settled = match status {
        RunStatus::Completed => ExecutionStatus::Completed,
        RunStatus::Failed => ExecutionStatus::Failed,
        RunStatus::Running => return,
    };
    for node in graph.nodes.iter_mut().filter(|n| n.status == ExecutionStatus::Running) {
        node.status = settled;
    }
    for edge in graph.edges.iter_mut() {
        edge.animated = false;
    }
}
