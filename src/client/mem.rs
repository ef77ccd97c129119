//! In-memory backend.
//!
//! Holds agents and tasks in memory and plays back a scripted sequence of run
//! states. Any operation can be made to fail, and every call is recorded, so
//! sessions can be driven without a server.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    CrewGraphError, Result,
    client::{ExportService, RunService, WorkflowSource},
    model::{Agent, ExecutionRun, RunId, RunRequest, RunStatus, Task, TaskUpdate},
};

/// Operations of the in-memory backend, used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MemOp {
    ListAgents,
    ListTasks,
    UpdateTask,
    DeleteAgent,
    DeleteTask,
    StartRun,
    GetRun,
    Export,
}

#[derive(Default)]
struct MemState {
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    /// states returned by successive `get_run` calls for a run started later
    script: Vec<ExecutionRun>,
    runs: HashMap<RunId, VecDeque<ExecutionRun>>,
    /// remaining injected failures per operation
    failures: HashMap<MemOp, u32>,
    calls: HashMap<MemOp, u32>,
    updates: Vec<(String, TaskUpdate)>,
    deleted: Vec<String>,
    requests: Vec<RunRequest>,
}

#[derive(Default)]
pub struct MemBackend {
    state: Mutex<MemState>,
}

impl MemBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_records(
        agents: Vec<Agent>,
        tasks: Vec<Task>,
    ) -> Arc<Self> {
        let backend = Self::new();
        backend.set_records(agents, tasks);
        backend
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        // poisoned by a panicking caller
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_records(
        &self,
        agents: Vec<Agent>,
        tasks: Vec<Task>,
    ) {
        let mut state = self.state();
        state.agents = agents;
        state.tasks = tasks;
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.state().agents.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    /// Change a task behind the session's back.
    pub fn assign_task(
        &self,
        task: &str,
        agent: &str,
    ) {
        if let Some(t) = self.state().tasks.iter_mut().find(|t| t.id == task) {
            t.agent_id = agent.to_string();
        }
    }

    /// States played back by `get_run` for every run started from now on.
    /// The last state repeats once the script is exhausted.
    pub fn script_run(
        &self,
        states: Vec<ExecutionRun>,
    ) {
        self.state().script = states;
    }

    /// Make the next `count` calls of `op` fail.
    pub fn fail(
        &self,
        op: MemOp,
        count: u32,
    ) {
        let mut state = self.state();
        if count == 0 {
            state.failures.remove(&op);
        } else {
            state.failures.insert(op, count);
        }
    }

    /// Make every call of `op` fail until [`MemBackend::recover`] is called.
    pub fn fail_always(
        &self,
        op: MemOp,
    ) {
        self.fail(op, u32::MAX);
    }

    pub fn recover(
        &self,
        op: MemOp,
    ) {
        self.state().failures.remove(&op);
    }

    /// Number of calls of `op` so far, failed ones included.
    pub fn calls(
        &self,
        op: MemOp,
    ) -> u32 {
        self.state().calls.get(&op).copied().unwrap_or_default()
    }

    /// Task updates received, in order.
    pub fn updates(&self) -> Vec<(String, TaskUpdate)> {
        self.state().updates.clone()
    }

    /// Ids of deleted records, prefixed with `agent-` or `task-`.
    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    pub fn run_requests(&self) -> Vec<RunRequest> {
        self.state().requests.clone()
    }

    /// Count the call and consume an injected failure if there is one.
    fn enter(
        &self,
        op: MemOp,
    ) -> Result<MutexGuard<'_, MemState>> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        if let Some(remaining) = state.failures.get_mut(&op) {
            if *remaining != u32::MAX {
                *remaining -= 1;
            }
            if *remaining == 0 {
                state.failures.remove(&op);
            }
            return Err(CrewGraphError::Client(format!("{} failed", op)));
        }
        Ok(state)
    }
}

#[async_trait]
impl WorkflowSource for MemBackend {
    async fn list_agents(
        &self,
        _project: &str,
    ) -> Result<Vec<Agent>> {
        Ok(self.enter(MemOp::ListAgents)?.agents.clone())
    }

    async fn list_tasks(
        &self,
        _project: &str,
    ) -> Result<Vec<Task>> {
        Ok(self.enter(MemOp::ListTasks)?.tasks.clone())
    }

    async fn update_task(
        &self,
        task: &str,
        update: &TaskUpdate,
    ) -> Result<Task> {
        let mut state = self.enter(MemOp::UpdateTask)?;
        state.updates.push((task.to_string(), update.clone()));
        let record = state.tasks.iter_mut().find(|t| t.id == task).ok_or_else(|| CrewGraphError::NotFound(format!("task {} not found", task)))?;
        if let Some(agent_id) = &update.agent_id {
            record.agent_id = agent_id.clone();
        }
        Ok(record.clone())
    }

    async fn delete_agent(
        &self,
        agent: &str,
    ) -> Result<()> {
        let mut state = self.enter(MemOp::DeleteAgent)?;
        state.agents.retain(|a| a.id != agent);
        for task in state.tasks.iter_mut().filter(|t| t.agent_id == agent) {
            task.agent_id.clear();
        }
        state.deleted.push(format!("agent-{}", agent));
        Ok(())
    }

    async fn delete_task(
        &self,
        task: &str,
    ) -> Result<()> {
        let mut state = self.enter(MemOp::DeleteTask)?;
        state.tasks.retain(|t| t.id != task);
        state.deleted.push(format!("task-{}", task));
        Ok(())
    }
}

#[async_trait]
impl RunService for MemBackend {
    async fn start_run(
        &self,
        _project: &str,
        request: &RunRequest,
    ) -> Result<ExecutionRun> {
        let mut state = self.enter(MemOp::StartRun)?;
        state.requests.push(request.clone());

        let run_id = uuid::Uuid::new_v4().to_string();
        let frames: VecDeque<ExecutionRun> = state
            .script
            .iter()
            .map(|frame| ExecutionRun {
                id: run_id.clone(),
                ..frame.clone()
            })
            .collect();
        state.runs.insert(run_id.clone(), frames);

        Ok(ExecutionRun::new(run_id, RunStatus::Running))
    }

    async fn get_run(
        &self,
        run: &str,
    ) -> Result<ExecutionRun> {
        let mut state = self.enter(MemOp::GetRun)?;
        let frames = state.runs.get_mut(run).ok_or_else(|| CrewGraphError::NotFound(format!("run {} not found", run)))?;
        let frame = if frames.len() > 1 { frames.pop_front() } else { frames.front().cloned() };
        Ok(frame.unwrap_or_else(|| ExecutionRun::new(run, RunStatus::Running)))
    }
}

#[async_trait]
impl ExportService for MemBackend {
    async fn export_project(
        &self,
        project: &str,
    ) -> Result<Vec<u8>> {
        let state = self.enter(MemOp::Export)?;
        let bundle = serde_json::json!({
            "project": project,
            "agents": state.agents,
            "tasks": state.tasks,
        });
        Ok(serde_json::to_vec(&bundle)?)
    }
}
