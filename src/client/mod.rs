//! External collaborators of an editing session.
//!
//! The session only talks to the outside world through these traits. An HTTP
//! binding for the workflow api and an in-memory backend are provided.

mod http;
mod mem;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Result,
    model::{Agent, ExecutionRun, RunRequest, Task, TaskUpdate},
};

pub use http::HttpClient;
pub use mem::{MemBackend, MemOp};

/// Source of truth for the agent and task records of a project.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    async fn list_agents(
        &self,
        project: &str,
    ) -> Result<Vec<Agent>>;

    async fn list_tasks(
        &self,
        project: &str,
    ) -> Result<Vec<Task>>;

    /// Apply a partial update to a task and return the stored record.
    async fn update_task(
        &self,
        task: &str,
        update: &TaskUpdate,
    ) -> Result<Task>;

    async fn delete_agent(
        &self,
        agent: &str,
    ) -> Result<()>;

    async fn delete_task(
        &self,
        task: &str,
    ) -> Result<()>;
}

/// Starts runs of a project and reports their status.
#[async_trait]
pub trait RunService: Send + Sync {
    async fn start_run(
        &self,
        project: &str,
        request: &RunRequest,
    ) -> Result<ExecutionRun>;

    async fn get_run(
        &self,
        run: &str,
    ) -> Result<ExecutionRun>;
}

/// Produces an opaque export bundle of a project.
#[async_trait]
pub trait ExportService: Send + Sync {
    async fn export_project(
        &self,
        project: &str,
    ) -> Result<Vec<u8>>;
}

/// The set of services a session is wired to.
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn WorkflowSource>,
    pub runs: Arc<dyn RunService>,
    pub export: Arc<dyn ExportService>,
}

impl Services {
    /// Use one backend for every service.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: WorkflowSource + RunService + ExportService + 'static,
    {
        Self {
            source: backend.clone(),
            runs: backend.clone(),
            export: backend,
        }
    }
}

