//! Domain-to-graph mapping.
//!
//! Converts agent and task records into graph nodes and the edges implied by
//! each task's `agent_id`. Positions are left zeroed; placing nodes is the
//! job of the layout engine.

use std::collections::HashMap;

use crate::{
    graph::{EdgeOrigin, Graph, GraphEdge, GraphNode, agent_node_id, task_node_id},
    model::{Agent, Task},
};

/// Build the raw graph for `agents` and `tasks`.
///
/// One node per agent, in input order, followed by one node per task, in
/// input order. A task whose `agent_id` does not resolve to a known agent
/// stays an orphan node without an edge.
pub fn map_workflow(
    agents: &[Agent],
    tasks: &[Task],
) -> Graph {
    let names: HashMap<&str, &str> = agents.iter().map(|a| (a.id.as_str(), a.name.as_str())).collect();

    let mut graph = Graph::new();
    graph.nodes.extend(agents.iter().map(GraphNode::agent));

    for task in tasks {
        let agent_name = task.assigned_agent().and_then(|aid| names.get(aid)).map(|n| n.to_string());
        graph.nodes.push(GraphNode::task(task, agent_name));

        if let Some(aid) = task.assigned_agent().filter(|aid| names.contains_key(aid)) {
            graph.add_edge(GraphEdge::new(agent_node_id(aid), task_node_id(&task.id), EdgeOrigin::Derived));
        }
    }

    graph
}

/// Name of the agent `task` is assigned to, if that agent is in `agents`.
pub(crate) fn resolve_agent_name(
    agents: &[Agent],
    task: &Task,
) -> Option<String> {
    let aid = task.assigned_agent()?;
    agents.iter().find(|a| a.id == aid).map(|a| a.name.clone())
}
