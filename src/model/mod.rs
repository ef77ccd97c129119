mod agent;
mod execution;
pub(crate) mod id;
mod task;

pub use agent::Agent;
pub use execution::{ExecutionRun, RunId, RunRequest, RunStatus};
pub use task::{Task, TaskUpdate};
