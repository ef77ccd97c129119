//! Identity-preserving merge of refreshed domain records.
//!
//! A refresh maps the new records and merges the result into the live graph
//! keyed by node id. Existing nodes keep their position, status and pin;
//! only their content is replaced. Layout runs again only when the set of
//! node or edge ids changed.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::{
    editor::Editor,
    graph::{GraphNode, NodeId, map_workflow},
    model::{Agent, Task},
};

/// What a refresh changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshOutcome {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    /// existing nodes whose content changed
    pub updated: Vec<NodeId>,
    pub relaid_out: bool,
}

impl RefreshOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty() && !self.relaid_out
    }
}

impl Editor {
    /// Merge a fresh agent/task listing into the graph.
    pub fn refresh(
        &mut self,
        agents: Vec<Agent>,
        tasks: Vec<Task>,
    ) -> RefreshOutcome {
        let fresh = map_workflow(&agents, &tasks);
        self.agents = agents;
        self.tasks = tasks;

        if self.graph.is_empty() {
            // first population: take everything and lay it out once
            let mut outcome = RefreshOutcome {
                added: fresh.nodes.iter().map(|n| n.id.clone()).collect(),
                ..Default::default()
            };
            self.graph = fresh;
            self.pending.clear();
            if !self.graph.is_empty() {
                self.layout_unpinned();
                outcome.relaid_out = true;
            }
            debug!(nodes = self.graph.nodes.len(), edges = self.graph.edges.len(), "graph populated");
            return outcome;
        }

        let node_ids_before = self.graph.node_ids();
        let edge_ids_before = self.graph.edge_ids();
        let fresh_ids = fresh.node_ids();

        let removed: BTreeSet<NodeId> = node_ids_before.difference(&fresh_ids).cloned().collect();
        self.graph.remove_nodes(&removed);
        self.pending.retain(|id| self.graph.edge(id).is_some());
        if self.dragging.as_ref().is_some_and(|d| removed.contains(d)) {
            self.dragging = None;
        }

        // rebuild the node list in mapper order, moving existing nodes over
        let mut existing: HashMap<NodeId, GraphNode> = std::mem::take(&mut self.graph.nodes).into_iter().map(|n| (n.id.clone(), n)).collect();
        let mut added = Vec::new();
        let mut updated = Vec::new();
        for fresh_node in fresh.nodes {
            match existing.remove(&fresh_node.id) {
                Some(mut node) => {
                    if node.data != fresh_node.data || node.ref_id != fresh_node.ref_id {
                        node.data = fresh_node.data;
                        node.ref_id = fresh_node.ref_id;
                        updated.push(node.id.clone());
                    }
                    self.graph.nodes.push(node);
                }
                None => {
                    added.push(fresh_node.id.clone());
                    self.graph.nodes.push(fresh_node);
                }
            }
        }

        // derived edges the drawing does not have yet
        for edge in fresh.edges {
            if self.graph.edge_between(&edge.source, &edge.target).is_none() {
                self.graph.add_edge(edge);
            }
        }

        let set_changed = self.graph.node_ids() != node_ids_before || self.graph.edge_ids() != edge_ids_before;
        if set_changed {
            self.layout_unpinned();
        } else if !updated.is_empty() {
            self.touch();
        }

        let outcome = RefreshOutcome {
            added,
            removed: removed.into_iter().collect(),
            updated,
            relaid_out: set_changed,
        };
        if !outcome.is_noop() {
            debug!(
                added = outcome.added.len(),
                removed = outcome.removed.len(),
                updated = outcome.updated.len(),
                relaid_out = outcome.relaid_out,
                "graph refreshed"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{EdgeOrigin, ExecutionStatus, GraphEdge, Position},
        model::{ExecutionRun, RunStatus},
    };

    fn crew() -> (Vec<Agent>, Vec<Task>) {
        (
            vec![Agent::new("1", "Researcher"), Agent::new("2", "Writer")],
            vec![Task::new("1", "Collect sources").assigned_to("1"), Task::new("2", "Draft").assigned_to("2")],
        )
    }

    fn editor() -> Editor {
        let (agents, tasks) = crew();
        let mut editor = Editor::default();
        let outcome = editor.refresh(agents, tasks);
        assert_eq!(outcome.added.len(), 4);
        assert!(outcome.relaid_out);
        editor
    }

    #[test]
    fn test_identity_preserved_on_rename() {
        let mut editor = editor();
        editor.move_node("agent-1", Position::new(100.0, 50.0)).unwrap();

        let (mut agents, tasks) = crew();
        agents[0].name = "Lead Researcher".to_string();
        let outcome = editor.refresh(agents, tasks);

        assert_eq!(outcome.updated, vec!["agent-1".to_string(), "task-1".to_string()]);
        assert!(!outcome.relaid_out);
        let node = editor.graph().node("agent-1").unwrap();
        assert_eq!(node.position, Position::new(100.0, 50.0));
        assert_eq!(node.as_agent().unwrap().name, "Lead Researcher");
        // derived agent name on the task follows
        let task = editor.graph().node("task-1").unwrap().as_task().unwrap();
        assert_eq!(task.agent_name.as_deref(), Some("Lead Researcher"));
    }

    #[test]
    fn test_unchanged_refresh_is_noop() {
        let mut editor = editor();
        let before = editor.graph().clone();
        let revision = editor.revision();
        let (agents, tasks) = crew();
        assert!(editor.refresh(agents, tasks).is_noop());
        assert_eq!(editor.graph(), &before);
        assert_eq!(editor.revision(), revision);
    }

    #[test]
    fn test_status_survives_refresh() {
        let mut editor = editor();
        editor.begin_run(&ExecutionRun::new("r1", RunStatus::Running));
        editor.graph.nodes[0].status = ExecutionStatus::Running;
        let position = editor.graph().nodes[0].position;

        let (agents, tasks) = crew();
        editor.refresh(agents, tasks);
        assert_eq!(editor.graph().nodes[0].status, ExecutionStatus::Running);
        assert_eq!(editor.graph().nodes[0].position, position);
    }

    #[test]
    fn test_added_node_gets_laid_out_pinned_stay() {
        let mut editor = editor();
        editor.move_node("task-1", Position::new(7.0, 7.0)).unwrap();

        let (mut agents, mut tasks) = crew();
        agents.push(Agent::new("3", "Editor"));
        tasks.push(Task::new("3", "Proofread").assigned_to("3"));
        let outcome = editor.refresh(agents, tasks);

        assert_eq!(outcome.added, vec!["agent-3".to_string(), "task-3".to_string()]);
        assert!(outcome.relaid_out);
        assert_eq!(editor.graph().node("agent-3").unwrap().position, Position::new(680.0, 0.0));
        assert_eq!(editor.graph().node("task-1").unwrap().position, Position::new(7.0, 7.0));
        assert!(editor.graph().edge("agent-3-task-3").is_some());

        let ids: Vec<&str> = editor.graph().nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["agent-1", "agent-2", "agent-3", "task-1", "task-2", "task-3"]);
    }

    #[test]
    fn test_removed_agent_drops_node_and_edges() {
        let mut editor = editor();
        let (mut agents, tasks) = crew();
        agents.remove(1);
        let outcome = editor.refresh(agents, tasks);

        assert_eq!(outcome.removed, vec!["agent-2".to_string()]);
        assert!(editor.graph().node("agent-2").is_none());
        assert!(editor.graph().edge("agent-2-task-2").is_none());
        assert_eq!(editor.graph().node("task-2").unwrap().as_task().unwrap().agent_name, None);
    }

    #[test]
    fn test_dragged_node_is_not_moved() {
        let mut editor = editor();
        editor.begin_drag("agent-2").unwrap();
        editor.graph.node_mut("agent-2").unwrap().position = Position::new(33.0, 44.0);

        let (mut agents, tasks) = crew();
        agents.insert(0, Agent::new("0", "Planner"));
        editor.refresh(agents, tasks);
        assert_eq!(editor.graph().node("agent-2").unwrap().position, Position::new(33.0, 44.0));
        assert_eq!(editor.graph().node("agent-0").unwrap().position, Position::new(0.0, 0.0));
        assert_eq!(editor.graph().node("agent-1").unwrap().position, Position::new(340.0, 0.0));
    }

    #[test]
    fn test_drawn_edge_kept_when_assignment_changes_elsewhere() {
        let mut editor = editor();
        let pending = editor.connect("task-2", "agent-1").unwrap();
        editor.commit_connection(&pending);
        assert!(editor.graph().edge("agent-2-task-2").is_none());

        // another view moves task 2 back to agent 2 without a resync
        let (agents, tasks) = crew();
        editor.refresh(agents, tasks);
        assert!(editor.graph().edge("task-2-agent-1").is_some());
        assert!(editor.graph().edge("agent-2-task-2").is_some());

        editor.resync_edges();
        assert!(editor.graph().edge("task-2-agent-1").is_none());
    }

    #[test]
    fn test_pending_edge_survives_refresh() {
        let mut editor = editor();
        let pending = editor.connect("task-1", "agent-2").unwrap();
        let (agents, tasks) = crew();
        editor.refresh(agents, tasks);
        assert!(editor.graph().edge(&pending.edge_id).is_some());

        editor.graph.edges.push(GraphEdge::new("agent-9", "task-9", EdgeOrigin::Drawn));
        assert_eq!(editor.resync_edges(), 1);
        assert!(editor.graph().edge(&pending.edge_id).is_some());
    }

    #[test]
    fn test_refresh_to_empty() {
        let mut editor = editor();
        let outcome = editor.refresh(Vec::new(), Vec::new());
        assert_eq!(outcome.removed.len(), 4);
        assert!(editor.graph().is_empty());
    }
}
