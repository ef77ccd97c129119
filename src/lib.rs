//! # crewgraph
//!
//! crewgraph is the workflow graph engine behind a visual editor for crews of
//! AI agents. It turns agent and task records into a laid-out node/edge graph,
//! keeps that graph consistent while the user edits it, and projects the live
//! status of a run onto the nodes.
//!
//! ## Core Features
//!
//! - **Domain mapping**: agents and tasks become typed nodes, task assignments become edges
//! - **Layered layout**: deterministic top-to-bottom or left-to-right placement
//! - **Connection rules**: only agent/task pairs may be connected; a connection assigns the task
//! - **Live status**: a run is polled and its progress is folded onto the graph in place
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crewgraph::{Config, SessionBuilder, model::RunRequest};
//!
//! let config = Config::create("crewgraph.toml")?;
//! let session = SessionBuilder::new("1").config(config).build()?;
//!
//! session.connect("task-3", "agent-2").await?;
//! let run_id = session.start_run(RunRequest::default()).await?;
//! let snapshot = session.snapshot().await?;
//! println!("{}", snapshot.graph.schema());
//! ```

mod builder;
pub mod client;
mod common;
mod config;
pub mod editor;
mod error;
pub mod events;
pub mod graph;
pub mod model;
pub mod session;
mod utils;

pub use builder::SessionBuilder;
pub use config::{ActivityConfig, ApiConfig, Config, PollingConfig};
pub use editor::{Editor, EditorState};
pub use error::CrewGraphError;
pub use graph::Graph;
pub use session::{SessionHandle, Snapshot};

/// Result type alias for crewgraph operations.
pub type Result<T> = std::result::Result<T, CrewGraphError>;
