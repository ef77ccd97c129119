//! Editing session.
//!
//! A [`Session`] owns the [`Editor`] of one project and processes [`Command`]s
//! one at a time, each to completion. Network calls are the only suspension
//! points; commands sent meanwhile wait in the queue. The run poller and the
//! data poller deliver their results as commands too, so every mutation of
//! the editor happens on the session task.
//!
//! Callers talk to the session through a cloneable [`SessionHandle`].

mod poller;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    CrewGraphError, Result,
    client::Services,
    common::{BroadcastQueue, Queue},
    config::PollingConfig,
    editor::{Editor, EditorState, RefreshOutcome, RunTracker, RunUpdate, StatusApplied},
    events::{Notice, NoticeLevel, SessionEvent},
    graph::{Direction, EdgeId, Graph, NodeId, NodeKind, Position},
    model::{Agent, ExecutionRun, RunId, RunRequest, RunStatus, Task, TaskUpdate},
};

use poller::{DataPoller, RunPoller};

const COMMAND_QUEUE_SIZE: usize = 256;
const EVENT_QUEUE_SIZE: usize = 1024;

type Reply<T> = oneshot::Sender<T>;

/// A unit of work for the session loop.
pub(crate) enum Command {
    Load {
        reply: Reply<Result<RefreshOutcome>>,
    },
    /// Records fetched by the data poller. `generation` is the write counter
    /// sampled before the fetch started.
    Refreshed {
        generation: u64,
        agents: Vec<Agent>,
        tasks: Vec<Task>,
        ack: Reply<()>,
    },
    Connect {
        source: NodeId,
        target: NodeId,
        reply: Reply<Result<()>>,
    },
    Disconnect {
        edge_id: EdgeId,
        reply: Reply<Result<()>>,
    },
    BeginDrag {
        node: NodeId,
        reply: Reply<Result<()>>,
    },
    MoveNode {
        node: NodeId,
        position: Position,
        reply: Reply<Result<()>>,
    },
    EndDrag,
    Delete {
        nodes: Vec<NodeId>,
        reply: Reply<Vec<NodeId>>,
    },
    Clear {
        purge: bool,
        reply: Reply<()>,
    },
    Validate {
        reply: Reply<Result<()>>,
    },
    Relayout {
        reply: Reply<()>,
    },
    SetDirection {
        direction: Direction,
        reply: Reply<()>,
    },
    ResyncEdges {
        reply: Reply<usize>,
    },
    StartRun {
        request: RunRequest,
        reply: Reply<Result<RunId>>,
    },
    /// A poll result for `run_id`. The ack tells the poller whether to go on.
    RunPolled {
        run_id: RunId,
        seq: u64,
        result: Result<ExecutionRun>,
        ack: Reply<bool>,
    },
    Export {
        reply: Reply<Result<Vec<u8>>>,
    },
    Snapshot {
        reply: Reply<Snapshot>,
    },
    Schema {
        reply: Reply<String>,
    },
}

/// Copy of the editor state at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub graph: Graph,
    pub state: EditorState,
    pub revision: u64,
    pub run: Option<RunTracker>,
}

pub(crate) struct Session {
    project: String,
    editor: Editor,
    services: Services,
    polling: PollingConfig,
    data_polling: bool,

    queue: Arc<Queue<Command>>,
    events: Arc<BroadcastQueue<SessionEvent>>,
    /// external writes so far; refreshes fetched before a write are stale
    writes: Arc<AtomicU64>,

    cancel: CancellationToken,
    run_cancel: Option<CancellationToken>,
}

impl Session {
    pub(crate) fn new(
        project: String,
        editor: Editor,
        services: Services,
        polling: PollingConfig,
        data_polling: bool,
    ) -> Self {
        Self {
            project,
            editor,
            services,
            polling,
            data_polling,
            queue: Queue::new(COMMAND_QUEUE_SIZE),
            events: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            writes: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            run_cancel: None,
        }
    }

    pub(crate) fn handle(&self) -> SessionHandle {
        SessionHandle {
            queue: self.queue.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Load the workflow, start the data poller and process commands until
    /// the session is shut down.
    pub(crate) async fn run(mut self) {
        info!(project = %self.project, "session started");
        // failures are reported as notices
        let _ = self.load().await;

        if self.data_polling {
            let poller = DataPoller {
                project: self.project.clone(),
                source: self.services.source.clone(),
                queue: self.queue.clone(),
                interval: self.polling.data_interval(),
                writes: self.writes.clone(),
                cancel: self.cancel.child_token(),
            };
            tokio::spawn(poller.run());
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(cmd) = self.queue.next_async() => self.dispatch(cmd).await,
            }
        }

        self.stop_run_poller();
        info!(project = %self.project, "session stopped");
    }

    async fn dispatch(
        &mut self,
        cmd: Command,
    ) {
        match cmd {
            Command::Load {
                reply,
            } => {
                let _ = reply.send(self.load().await);
            }
            Command::Refreshed {
                generation,
                agents,
                tasks,
                ack,
            } => {
                if generation == self.writes.load(Ordering::Acquire) {
                    self.apply_refresh(agents, tasks);
                } else {
                    debug!(generation, "refresh fetched before a write, dropped");
                }
                let _ = ack.send(());
            }
            Command::Connect {
                source,
                target,
                reply,
            } => {
                let _ = reply.send(self.connect(&source, &target).await);
            }
            Command::Disconnect {
                edge_id,
                reply,
            } => {
                let ret = self.editor.disconnect(&edge_id).map(|_| ());
                self.graph_changed();
                let _ = reply.send(ret);
            }
            Command::BeginDrag {
                node,
                reply,
            } => {
                let _ = reply.send(self.editor.begin_drag(&node));
            }
            Command::MoveNode {
                node,
                position,
                reply,
            } => {
                let ret = self.editor.move_node(&node, position);
                self.graph_changed();
                let _ = reply.send(ret);
            }
            Command::EndDrag => self.editor.end_drag(),
            Command::Delete {
                nodes,
                reply,
            } => {
                let _ = reply.send(self.delete(&nodes).await);
            }
            Command::Clear {
                purge,
                reply,
            } => {
                self.clear(purge).await;
                let _ = reply.send(());
            }
            Command::Validate {
                reply,
            } => {
                let ret = self.editor.validate();
                match &ret {
                    Ok(()) => self.notify(Notice::success("Validation", "workflow is valid")),
                    Err(err) => self.notify(Notice::from_error("Validation", err)),
                }
                let _ = reply.send(ret);
            }
            Command::Relayout {
                reply,
            } => {
                self.editor.relayout();
                self.graph_changed();
                let _ = reply.send(());
            }
            Command::SetDirection {
                direction,
                reply,
            } => {
                self.editor.set_direction(direction);
                self.graph_changed();
                let _ = reply.send(());
            }
            Command::ResyncEdges {
                reply,
            } => {
                let changed = self.editor.resync_edges();
                if changed > 0 {
                    self.graph_changed();
                }
                let _ = reply.send(changed);
            }
            Command::StartRun {
                request,
                reply,
            } => {
                let _ = reply.send(self.start_run(request).await);
            }
            Command::RunPolled {
                run_id,
                seq,
                result,
                ack,
            } => {
                let keep_polling = self.run_polled(run_id, seq, result);
                let _ = ack.send(keep_polling);
            }
            Command::Export {
                reply,
            } => {
                let ret = self.services.export.export_project(&self.project).await;
                if let Err(err) = &ret {
                    self.notify(Notice::from_error("Export", err));
                }
                let _ = reply.send(ret);
            }
            Command::Snapshot {
                reply,
            } => {
                let _ = reply.send(Snapshot {
                    graph: self.editor.graph().clone(),
                    state: self.editor.state(),
                    revision: self.editor.revision(),
                    run: self.editor.current_run().cloned(),
                });
            }
            Command::Schema {
                reply,
            } => {
                let _ = reply.send(self.editor.schema());
            }
        }
    }

    fn emit(
        &self,
        event: SessionEvent,
    ) {
        if let Err(err) = self.events.send(event) {
            error!(error = %err, "failed to publish session event");
        }
    }

    fn notify(
        &self,
        notice: Notice,
    ) {
        self.emit(SessionEvent::Notice(notice));
    }

    fn graph_changed(&self) {
        self.emit(SessionEvent::GraphChanged {
            revision: self.editor.revision(),
        });
    }

    fn stop_run_poller(&mut self) {
        if let Some(token) = self.run_cancel.take() {
            token.cancel();
        }
    }

    async fn load(&mut self) -> Result<RefreshOutcome> {
        let source = &self.services.source;
        let fetched = futures::future::try_join(source.list_agents(&self.project), source.list_tasks(&self.project)).await;
        match fetched {
            Ok((agents, tasks)) => Ok(self.apply_refresh(agents, tasks)),
            Err(err) => {
                warn!(project = %self.project, error = %err, "loading workflow failed");
                self.notify(Notice::from_error("Workflow", &err));
                Err(err)
            }
        }
    }

    fn apply_refresh(
        &mut self,
        agents: Vec<Agent>,
        tasks: Vec<Task>,
    ) -> RefreshOutcome {
        let outcome = self.editor.refresh(agents, tasks);
        if !outcome.is_noop() {
            self.graph_changed();
        }
        outcome
    }

    async fn connect(
        &mut self,
        source: &str,
        target: &str,
    ) -> Result<()> {
        let pending = match self.editor.connect(source, target) {
            Ok(pending) => pending,
            Err(err) => {
                self.notify(Notice::from_error("Connection", &err));
                return Err(err);
            }
        };
        if pending.optimistic {
            self.graph_changed();
        }

        let update = TaskUpdate::assign(pending.assignment.agent_ref.clone());
        match self.services.source.update_task(&pending.assignment.task_ref, &update).await {
            Ok(_) => {
                self.writes.fetch_add(1, Ordering::AcqRel);
                self.editor.commit_connection(&pending);
                self.graph_changed();
                self.notify(Notice::success("Connection", "connection saved"));
                Ok(())
            }
            Err(err) => {
                warn!(task = %pending.assignment.task_ref, agent = %pending.assignment.agent_ref, error = %err, "saving connection failed");
                self.editor.rollback_connection(&pending);
                self.graph_changed();
                let err = CrewGraphError::Persistence(err.to_string());
                self.notify(Notice::from_error("Connection", &err));
                Err(err)
            }
        }
    }

    /// Remove nodes locally, then their records. Returns the ids of the nodes
    /// removed from the graph; record deletions that fail are reported as notices.
    async fn delete(
        &mut self,
        nodes: &[NodeId],
    ) -> Vec<NodeId> {
        let removed = self.editor.delete_nodes(nodes);
        if removed.is_empty() {
            return Vec::new();
        }
        self.graph_changed();

        // tasks first so that no task is left pointing at a deleted agent
        let mut ordered: Vec<_> = removed.iter().collect();
        ordered.sort_by_key(|n| n.kind() == NodeKind::Agent);
        for node in ordered {
            let ret = match node.kind() {
                NodeKind::Task => self.services.source.delete_task(&node.ref_id).await,
                NodeKind::Agent => self.services.source.delete_agent(&node.ref_id).await,
            };
            self.writes.fetch_add(1, Ordering::AcqRel);
            if let Err(err) = ret {
                warn!(node = %node.id, error = %err, "deleting record failed");
                self.notify(Notice::from_error(format!("Delete {}", node.label()), &err));
            }
        }
        removed.into_iter().map(|n| n.id).collect()
    }

    async fn clear(
        &mut self,
        purge: bool,
    ) {
        self.stop_run_poller();
        if purge {
            let tasks: Vec<String> = self.editor.tasks().iter().map(|t| t.id.clone()).collect();
            let agents: Vec<String> = self.editor.agents().iter().map(|a| a.id.clone()).collect();
            let mut failed = 0;
            for id in &tasks {
                if self.services.source.delete_task(id).await.is_err() {
                    failed += 1;
                }
            }
            for id in &agents {
                if self.services.source.delete_agent(id).await.is_err() {
                    failed += 1;
                }
            }
            self.writes.fetch_add(1, Ordering::AcqRel);
            if failed > 0 {
                self.notify(Notice::from_error("Clear", &CrewGraphError::Client(format!("{} records could not be deleted", failed))));
            }
        }
        self.editor.clear();
        self.graph_changed();
    }

    async fn start_run(
        &mut self,
        request: RunRequest,
    ) -> Result<RunId> {
        if self.editor.graph().is_empty() {
            let err = CrewGraphError::Validation("add at least one agent or task".to_string());
            self.notify(Notice::from_error("Run", &err));
            return Err(err);
        }

        let run = match self.services.runs.start_run(&self.project, &request).await {
            Ok(run) => run,
            Err(err) => {
                let err = CrewGraphError::RunStart(err.to_string());
                error!(project = %self.project, error = %err, "starting run failed");
                self.notify(Notice::from_error("Run", &err));
                return Err(err);
            }
        };

        self.stop_run_poller();
        self.editor.begin_run(&run);
        self.graph_changed();
        info!(project = %self.project, run = %run.id, "run started");
        self.notify(Notice::info("Run", format!("run {} started", run.id)));

        if run.status.is_terminal() {
            self.run_finished(&run.id, run.status, run.error.as_deref());
        } else {
            let token = self.cancel.child_token();
            let poller = RunPoller {
                run_id: run.id.clone(),
                runs: self.services.runs.clone(),
                queue: self.queue.clone(),
                interval: self.polling.run_interval(),
                cancel: token.clone(),
            };
            self.run_cancel = Some(token);
            tokio::spawn(poller.run());
        }
        Ok(run.id)
    }

    /// Fold a poll result into the editor. Returns whether to keep polling.
    fn run_polled(
        &mut self,
        run_id: RunId,
        seq: u64,
        result: Result<ExecutionRun>,
    ) -> bool {
        let run = match result {
            Ok(run) => run,
            Err(err) => return self.poll_failed(&run_id, err),
        };
        let error = run.error.clone();
        let update = RunUpdate {
            run_id,
            seq,
            run,
        };
        match self.editor.apply_run_status(&update) {
            StatusApplied::Stale => self.editor.current_run().is_some_and(|t| t.run_id == update.run_id && t.is_in_flight()),
            StatusApplied::Running(active) => {
                debug!(run = %update.run_id, seq, active = active.len(), "run in progress");
                self.graph_changed();
                self.within_poll_budget()
            }
            StatusApplied::Finished(status) => {
                self.graph_changed();
                self.run_finished(&update.run_id, status, error.as_deref());
                false
            }
        }
    }

    fn poll_failed(
        &mut self,
        run_id: &str,
        err: CrewGraphError,
    ) -> bool {
        let Some(failures) = self.editor.record_poll_failure(run_id) else {
            return false;
        };
        warn!(run = %run_id, failures, error = %err, "polling run failed");
        if failures == self.polling.poll_error_threshold {
            self.notify(Notice::from_error("Run", &CrewGraphError::Poll(err.to_string())));
        }
        self.within_poll_budget()
    }

    /// Stop watching once the run was polled `max_run_polls` times. Zero means no limit.
    fn within_poll_budget(&mut self) -> bool {
        let max = self.polling.max_run_polls;
        let polls = self.editor.current_run().map(|t| t.polls).unwrap_or_default();
        if max == 0 || polls < max {
            return true;
        }
        if let Some(tracker) = self.editor.detach_run() {
            warn!(run = %tracker.run_id, polls, "run still going, stopped watching");
            self.notify(Notice::warning("Run", format!("stopped watching run {} after {} polls", tracker.run_id, polls)));
            self.graph_changed();
        }
        self.run_cancel = None;
        false
    }

    fn run_finished(
        &mut self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) {
        self.run_cancel = None;
        self.emit(SessionEvent::RunFinished {
            run_id: run_id.to_string(),
            status,
        });
        match status {
            RunStatus::Failed => {
                let message = error.unwrap_or("run failed");
                self.notify(Notice::new(NoticeLevel::Error, "Run", format!("run {} failed: {}", run_id, message)));
            }
            _ => self.notify(Notice::success("Run", format!("run {} completed", run_id))),
        }
    }
}

/// Cloneable handle to a running [`Session`].
///
/// Every method queues a command and waits for the session to process it.
/// Once the session is shut down every method fails with a `Session` error.
#[derive(Clone)]
pub struct SessionHandle {
    queue: Arc<Queue<Command>>,
    events: Arc<BroadcastQueue<SessionEvent>>,
    cancel: CancellationToken,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T> {
        let closed = || CrewGraphError::Session("session closed".to_string());
        if self.cancel.is_cancelled() {
            return Err(closed());
        }
        let (reply, rx) = oneshot::channel();
        tokio::select! {
            ret = self.queue.send_async(build(reply)) => ret?,
            _ = self.cancel.cancelled() => return Err(closed()),
        }
        tokio::select! {
            ret = rx => ret.map_err(|_| closed()),
            _ = self.cancel.cancelled() => Err(closed()),
        }
    }

    /// Fetch agents and tasks now and merge them into the graph.
    pub async fn load(&self) -> Result<RefreshOutcome> {
        self.request(|reply| Command::Load {
            reply,
        })
        .await?
    }

    /// Draw a connection and persist the implied assignment.
    pub async fn connect(
        &self,
        source: &str,
        target: &str,
    ) -> Result<()> {
        self.request(|reply| Command::Connect {
            source: source.to_string(),
            target: target.to_string(),
            reply,
        })
        .await?
    }

    pub async fn disconnect(
        &self,
        edge_id: &str,
    ) -> Result<()> {
        self.request(|reply| Command::Disconnect {
            edge_id: edge_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn begin_drag(
        &self,
        node: &str,
    ) -> Result<()> {
        self.request(|reply| Command::BeginDrag {
            node: node.to_string(),
            reply,
        })
        .await?
    }

    pub async fn move_node(
        &self,
        node: &str,
        position: Position,
    ) -> Result<()> {
        self.request(|reply| Command::MoveNode {
            node: node.to_string(),
            position,
            reply,
        })
        .await?
    }

    pub async fn end_drag(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CrewGraphError::Session("session closed".to_string()));
        }
        self.queue.send_async(Command::EndDrag).await
    }

    /// Delete nodes and their records. Returns the ids removed from the graph.
    pub async fn delete(
        &self,
        nodes: &[NodeId],
    ) -> Result<Vec<NodeId>> {
        self.request(|reply| Command::Delete {
            nodes: nodes.to_vec(),
            reply,
        })
        .await
    }

    /// Empty the graph and stop watching the current run. With `purge` the
    /// agent and task records are deleted as well.
    pub async fn clear(
        &self,
        purge: bool,
    ) -> Result<()> {
        self.request(|reply| Command::Clear {
            purge,
            reply,
        })
        .await
    }

    pub async fn validate(&self) -> Result<()> {
        self.request(|reply| Command::Validate {
            reply,
        })
        .await?
    }

    pub async fn relayout(&self) -> Result<()> {
        self.request(|reply| Command::Relayout {
            reply,
        })
        .await
    }

    pub async fn set_direction(
        &self,
        direction: Direction,
    ) -> Result<()> {
        self.request(|reply| Command::SetDirection {
            direction,
            reply,
        })
        .await
    }

    /// Reconcile drawn edges with the task records. Returns the number of edges changed.
    pub async fn resync_edges(&self) -> Result<usize> {
        self.request(|reply| Command::ResyncEdges {
            reply,
        })
        .await
    }

    /// Start a run of the project and watch it. Returns the run id.
    pub async fn start_run(
        &self,
        request: RunRequest,
    ) -> Result<RunId> {
        self.request(|reply| Command::StartRun {
            request,
            reply,
        })
        .await?
    }

    pub async fn export(&self) -> Result<Vec<u8>> {
        self.request(|reply| Command::Export {
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.request(|reply| Command::Snapshot {
            reply,
        })
        .await
    }

    pub async fn schema(&self) -> Result<String> {
        self.request(|reply| Command::Schema {
            reply,
        })
        .await
    }

    /// subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// session events as a stream
    pub fn events(&self) -> BroadcastStream<SessionEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    /// Stop the session and its pollers. Runs already started keep running
    /// on the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
