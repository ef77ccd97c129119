//! Workflow editor controller.
//!
//! The editor owns the live graph of a single editing session. It merges
//! refreshed domain records into existing nodes by id, applies user edits,
//! and projects run status onto node data. It never talks to the network;
//! the session performs the side effects and reports their outcome back.

pub mod activity;
mod refresh;
mod run;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    CrewGraphError, Result,
    graph::{
        self, Assignment, Direction, EdgeId, EdgeOrigin, Graph, GraphEdge, GraphNode, LayoutOptions, NodeData, NodeId, NodeKind, Position, compute_layout,
        implied_assignment, map_workflow, resolve_agent_name,
    },
    model::{Agent, Task},
};

pub use refresh::RefreshOutcome;
pub use run::{RunTracker, RunUpdate, StatusApplied};

const DEFAULT_LOG_WINDOW: usize = 15;

/// Coarse state of an editing session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EditorState {
    /// No nodes.
    Empty,
    /// Nodes present, nothing in progress.
    Populated,
    /// A drag or an unconfirmed connection is in progress.
    Editing,
    /// A run is in flight. Editing stays possible.
    Running,
}

/// A connection accepted by the validator and waiting for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnection {
    pub edge_id: EdgeId,
    pub assignment: Assignment,
    /// false when an edge between the two nodes already existed
    pub optimistic: bool,
}

pub struct Editor {
    graph: Graph,
    /// last known domain records
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    options: LayoutOptions,
    log_window: usize,
    dragging: Option<NodeId>,
    /// optimistic edges awaiting persistence
    pending: BTreeSet<EdgeId>,
    run: Option<RunTracker>,
    revision: u64,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(LayoutOptions::default())
    }
}

impl Editor {
    pub fn new(options: LayoutOptions) -> Self {
        Self {
            graph: Graph::new(),
            agents: Vec::new(),
            tasks: Vec::new(),
            options,
            log_window: DEFAULT_LOG_WINDOW,
            dragging: None,
            pending: BTreeSet::new(),
            run: None,
            revision: 0,
        }
    }

    /// Number of trailing log lines used to detect active nodes.
    pub fn with_log_window(
        mut self,
        log_window: usize,
    ) -> Self {
        self.log_window = log_window;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn layout_options(&self) -> &LayoutOptions {
        &self.options
    }

    pub fn direction(&self) -> Direction {
        self.options.direction
    }

    /// Bumped on every mutation of the graph.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn dragging(&self) -> Option<&NodeId> {
        self.dragging.as_ref()
    }

    pub fn state(&self) -> EditorState {
        if self.graph.is_empty() {
            EditorState::Empty
        } else if self.run.as_ref().is_some_and(RunTracker::is_in_flight) {
            EditorState::Running
        } else if self.dragging.is_some() || !self.pending.is_empty() {
            EditorState::Editing
        } else {
            EditorState::Populated
        }
    }

    pub fn schema(&self) -> String {
        self.graph.schema()
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // ---------------------------------------------------------------- connect

    /// Check a proposed edge and add it optimistically.
    ///
    /// Illegal pairs are rejected with a `Validation` error and leave the graph
    /// untouched. The caller must persist the returned assignment and then call
    /// [`Editor::commit_connection`] or [`Editor::rollback_connection`].
    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
    ) -> Result<PendingConnection> {
        let source_node = self.graph.node(source);
        let target_node = self.graph.node(target);
        let validation = graph::validator::validate_kinds(source_node.map(GraphNode::kind), target_node.map(GraphNode::kind));
        if !validation.legal {
            let reason = validation.reason.unwrap_or_else(|| graph::validator::INVALID_CONNECTION.to_string());
            debug!(source, target, reason = %reason, "connection rejected");
            return Err(CrewGraphError::Validation(reason));
        }

        let assignment = source_node
            .zip(target_node)
            .and_then(|(s, t)| implied_assignment(s, t))
            .ok_or_else(|| CrewGraphError::Validation(graph::validator::INVALID_CONNECTION.to_string()))?;

        if let Some(existing) = self.graph.edge_between(source, target) {
            return Ok(PendingConnection {
                edge_id: existing.id.clone(),
                assignment,
                optimistic: false,
            });
        }

        let edge = GraphEdge::new(source, target, EdgeOrigin::Drawn);
        let edge_id = edge.id.clone();
        self.graph.add_edge(edge);
        self.pending.insert(edge_id.clone());
        self.touch();
        debug!(edge = %edge_id, "optimistic edge added");

        Ok(PendingConnection {
            edge_id,
            assignment,
            optimistic: true,
        })
    }

    /// The assignment was persisted: record it locally and drop edges that
    /// tied the task to a different agent.
    pub fn commit_connection(
        &mut self,
        pending: &PendingConnection,
    ) {
        self.pending.remove(&pending.edge_id);
        let Assignment {
            task_ref,
            agent_ref,
        } = &pending.assignment;

        if let Some(task) = self.tasks.iter_mut().find(|t| &t.id == task_ref) {
            task.agent_id = agent_ref.clone();
        }
        let agent_name = self.tasks.iter().find(|t| &t.id == task_ref).and_then(|t| resolve_agent_name(&self.agents, t));

        let task_nid = graph::task_node_id(task_ref);
        let agent_nid = graph::agent_node_id(agent_ref);
        if let Some(NodeData::Task(data)) = self.graph.node_mut(&task_nid).map(|n| &mut n.data) {
            data.agent_name = agent_name;
        }

        let superseded: Vec<EdgeId> = self
            .graph
            .edges_of(&task_nid)
            .filter(|e| e.other(&task_nid).is_some_and(|o| o != &agent_nid && self.graph.node(o).is_some_and(|n| n.kind() == NodeKind::Agent)))
            .map(|e| e.id.clone())
            .collect();
        for id in superseded {
            debug!(edge = %id, "edge superseded by new assignment");
            self.graph.remove_edge(&id);
            self.pending.remove(&id);
        }

        info!(task = %task_ref, agent = %agent_ref, "connection saved");
        self.touch();
    }

    /// Persistence failed: remove the optimistic edge.
    pub fn rollback_connection(
        &mut self,
        pending: &PendingConnection,
    ) {
        self.pending.remove(&pending.edge_id);
        if pending.optimistic && self.graph.remove_edge(&pending.edge_id).is_some() {
            debug!(edge = %pending.edge_id, "optimistic edge rolled back");
            self.touch();
        }
    }

    /// Remove a single edge from the drawing.
    pub fn disconnect(
        &mut self,
        edge_id: &str,
    ) -> Result<GraphEdge> {
        let edge = self.graph.remove_edge(edge_id).ok_or_else(|| CrewGraphError::NotFound(format!("edge {} not found", edge_id)))?;
        self.pending.remove(edge_id);
        self.touch();
        Ok(edge)
    }

    // ------------------------------------------------------------------- drag

    pub fn begin_drag(
        &mut self,
        nid: &str,
    ) -> Result<()> {
        if !self.graph.contains_node(nid) {
            return Err(CrewGraphError::NotFound(format!("node {} not found", nid)));
        }
        self.dragging = Some(nid.to_string());
        Ok(())
    }

    /// Move a node; the node is pinned from now on.
    pub fn move_node(
        &mut self,
        nid: &str,
        position: Position,
    ) -> Result<()> {
        let node = self.graph.node_mut(nid).ok_or_else(|| CrewGraphError::NotFound(format!("node {} not found", nid)))?;
        node.position = position;
        node.pinned = true;
        self.touch();
        Ok(())
    }

    pub fn end_drag(&mut self) {
        self.dragging = None;
    }

    // ----------------------------------------------------------------- delete

    /// Remove nodes and their edges. Returns the removed nodes so that the
    /// caller can delete the underlying records.
    pub fn delete_nodes(
        &mut self,
        ids: &[NodeId],
    ) -> Vec<GraphNode> {
        let ids: BTreeSet<NodeId> = ids.iter().cloned().collect();
        let removed = self.graph.remove_nodes(&ids);
        if removed.is_empty() {
            return removed;
        }

        for node in &removed {
            match node.kind() {
                NodeKind::Agent => self.agents.retain(|a| a.id != node.ref_id),
                NodeKind::Task => self.tasks.retain(|t| t.id != node.ref_id),
            }
        }
        self.pending.retain(|id| self.graph.edge(id).is_some());
        if self.dragging.as_ref().is_some_and(|d| ids.contains(d)) {
            self.dragging = None;
        }
        self.refresh_agent_names();

        info!(count = removed.len(), "nodes deleted");
        self.touch();
        removed
    }

    /// Empty the graph and forget the current run.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.agents.clear();
        self.tasks.clear();
        self.pending.clear();
        self.dragging = None;
        self.run = None;
        self.touch();
    }

    // --------------------------------------------------------------- validate

    /// Re-check every edge against the connection rules. Reports the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.graph.is_empty() {
            return Err(CrewGraphError::Validation("add at least one agent or task".to_string()));
        }
        for edge in &self.graph.edges {
            let source = self.graph.node(&edge.source).map(GraphNode::kind);
            let target = self.graph.node(&edge.target).map(GraphNode::kind);
            let validation = graph::validator::validate_kinds(source, target);
            if !validation.legal {
                let reason = validation.reason.unwrap_or_else(|| graph::validator::INVALID_CONNECTION.to_string());
                return Err(CrewGraphError::Validation(reason));
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------- layout

    /// Lay out the current nodes again. Pins are cleared.
    pub fn relayout(&mut self) {
        for node in self.graph.nodes.iter_mut() {
            node.pinned = false;
        }
        self.layout_unpinned();
    }

    pub fn set_direction(
        &mut self,
        direction: Direction,
    ) {
        self.options.direction = direction;
        self.relayout();
    }

    /// Lay out every node except pinned ones and the node being dragged.
    fn layout_unpinned(&mut self) {
        let layout = compute_layout(&self.graph.nodes, &self.graph.edges, &self.options);
        let dragging = self.dragging.clone();
        layout.apply(&mut self.graph.nodes, |n| n.pinned || dragging.as_ref() == Some(&n.id));
        self.touch();
    }

    // ----------------------------------------------------------------- resync

    /// Make the drawn edges agree with the domain records: drop agent-task
    /// edges the records do not back, add derived edges that are missing.
    /// Unconfirmed connections are left alone. Returns the number of edges changed.
    pub fn resync_edges(&mut self) -> usize {
        let stale: Vec<EdgeId> = self
            .graph
            .edges
            .iter()
            .filter(|e| !self.pending.contains(&e.id))
            .filter(|e| {
                let endpoints = self.graph.node(&e.source).zip(self.graph.node(&e.target));
                match endpoints.and_then(|(s, t)| implied_assignment(s, t)) {
                    Some(a) => !self.tasks.iter().any(|t| t.id == a.task_ref && t.agent_id == a.agent_ref),
                    None => true,
                }
            })
            .map(|e| e.id.clone())
            .collect();
        for id in &stale {
            self.graph.remove_edge(id);
        }

        let mut added = 0;
        for edge in map_workflow(&self.agents, &self.tasks).edges {
            if self.graph.edge_between(&edge.source, &edge.target).is_none() {
                self.graph.add_edge(edge);
                added += 1;
            }
        }

        let changed = stale.len() + added;
        if changed > 0 {
            info!(removed = stale.len(), added, "edges resynced");
            self.layout_unpinned();
        }
        changed
    }

    fn refresh_agent_names(&mut self) {
        for node in self.graph.nodes.iter_mut() {
            if let NodeData::Task(data) = &mut node.data {
                data.agent_name = self.tasks.iter().find(|t| t.id == node.ref_id).and_then(|t| resolve_agent_name(&self.agents, t));
            }
        }
    }
}
