//! Self-scheduling poll loops.
//!
//! Each loop sleeps, fetches, hands the result to the session and waits for
//! the acknowledgement before sleeping again, so a loop never overlaps itself.
//! Both stop when their token is cancelled.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    client::{RunService, WorkflowSource},
    common::Queue,
    model::RunId,
    session::Command,
};

/// Sleep for `interval` unless cancelled first. Returns false when cancelled.
async fn pause(
    interval: Duration,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Polls the status of one run until the session stops it.
pub(crate) struct RunPoller {
    pub run_id: RunId,
    pub runs: Arc<dyn RunService>,
    pub queue: Arc<Queue<Command>>,
    pub interval: Duration,
    pub cancel: CancellationToken,
}

impl RunPoller {
    pub async fn run(self) {
        debug!(run = %self.run_id, "run poller started");
        let mut seq = 0;
        loop {
            if !pause(self.interval, &self.cancel).await {
                break;
            }
            let result = tokio::select! {
                r = self.runs.get_run(&self.run_id) => r,
                _ = self.cancel.cancelled() => break,
            };
            seq += 1;

            let (ack, acked) = oneshot::channel();
            let cmd = Command::RunPolled {
                run_id: self.run_id.clone(),
                seq,
                result,
                ack,
            };
            if self.queue.send_async(cmd).await.is_err() {
                break;
            }
            // the session answers whether the run is still worth watching
            match acked.await {
                Ok(true) => {}
                _ => break,
            }
        }
        debug!(run = %self.run_id, polls = seq, "run poller stopped");
    }
}

/// Periodically re-reads agents and tasks.
pub(crate) struct DataPoller {
    pub project: String,
    pub source: Arc<dyn WorkflowSource>,
    pub queue: Arc<Queue<Command>>,
    pub interval: Duration,
    /// bumped by the session on every external write
    pub writes: Arc<AtomicU64>,
    pub cancel: CancellationToken,
}

impl DataPoller {
    pub async fn run(self) {
        debug!(project = %self.project, "data poller started");
        loop {
            if !pause(self.interval, &self.cancel).await {
                break;
            }
            let generation = self.writes.load(Ordering::Acquire);
            let fetched = tokio::select! {
                r = futures::future::try_join(self.source.list_agents(&self.project), self.source.list_tasks(&self.project)) => r,
                _ = self.cancel.cancelled() => break,
            };
            let (agents, tasks) = match fetched {
                Ok(records) => records,
                Err(err) => {
                    warn!(project = %self.project, error = %err, "refreshing workflow failed");
                    continue;
                }
            };

            let (ack, acked) = oneshot::channel();
            let cmd = Command::Refreshed {
                generation,
                agents,
                tasks,
                ack,
            };
            if self.queue.send_async(cmd).await.is_err() || acked.await.is_err() {
                break;
            }
        }
        debug!(project = %self.project, "data poller stopped");
    }
}
