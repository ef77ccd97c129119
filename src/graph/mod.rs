//! Workflow graph: typed nodes and edges, the domain mapper, the layout
//! engine and the connection rules. Everything in here is pure.

mod edge;
mod graph;
pub mod layout;
mod mapper;
mod node;
pub mod validator;

pub use edge::{EdgeId, EdgeOrigin, GraphEdge, edge_id};
pub use graph::Graph;
pub use layout::{Direction, Layout, LayoutOptions, Placement, Ranking, compute_layout};
pub(crate) use mapper::resolve_agent_name;
pub use mapper::map_workflow;
pub use node::{AgentNodeData, Anchors, ExecutionStatus, GraphNode, NodeData, NodeId, NodeKind, Position, Side, TaskNodeData, agent_node_id, task_node_id};
pub use validator::{Assignment, ConnectionValidation, implied_assignment, validate_connection};
