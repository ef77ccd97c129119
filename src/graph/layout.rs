//! Layered layout of the workflow graph.
//!
//! Nodes are grouped into ranks (agents first, tasks below them), kept in
//! input order inside a rank and spaced on a fixed grid. The result only
//! depends on the node order, the edge set and the options, so the same
//! graph always lays out the same way.

use std::collections::HashMap;

use petgraph::{
    Direction as EdgeDirection,
    algo::toposort,
    graph::{DiGraph, NodeIndex},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::graph::{Anchors, GraphEdge, GraphNode, NodeId, NodeKind, Position, Side};

/// Flow direction of the diagram.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Direction {
    #[default]
    #[serde(alias = "TB")]
    #[strum(to_string = "top-to-bottom", serialize = "TB")]
    TopToBottom,
    #[serde(alias = "LR")]
    #[strum(to_string = "left-to-right", serialize = "LR")]
    LeftToRight,
}

impl Direction {
    pub fn anchors(&self) -> Anchors {
        match self {
            Direction::TopToBottom => Anchors {
                source: Side::Bottom,
                target: Side::Top,
            },
            Direction::LeftToRight => Anchors {
                source: Side::Right,
                target: Side::Left,
            },
        }
    }
}

/// How nodes are assigned to ranks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Ranking {
    /// Agents on rank 0, tasks on rank 1.
    #[default]
    ByKind,
    /// Longest path from a source node, agent-task edges oriented agent first.
    LongestPath,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LayoutOptions {
    pub direction: Direction,
    pub node_width: f64,
    pub node_height: f64,
    /// gap between neighbours of the same rank
    pub node_spacing: f64,
    /// gap between consecutive ranks
    pub rank_spacing: f64,
    pub ranking: Ranking,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            direction: Direction::TopToBottom,
            node_width: 260.0,
            node_height: 180.0,
            node_spacing: 80.0,
            rank_spacing: 100.0,
            ranking: Ranking::ByKind,
        }
    }
}

/// Computed placement of one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Position,
    pub rank: usize,
    pub anchors: Anchors,
}

/// Result of a layout pass, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    placements: HashMap<NodeId, Placement>,
}

impl Layout {
    pub fn get(
        &self,
        nid: &str,
    ) -> Option<&Placement> {
        self.placements.get(nid)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Placement)> {
        self.placements.iter()
    }

    /// Write placements into `nodes`, skipping nodes for which `keep` returns true.
    /// Anchors are updated for every node so that edges follow the direction.
    pub fn apply<F>(
        &self,
        nodes: &mut [GraphNode],
        keep: F,
    ) where
        F: Fn(&GraphNode) -> bool,
    {
        for node in nodes.iter_mut() {
            let Some(placement) = self.placements.get(&node.id) else {
                continue;
            };
            node.anchors = placement.anchors;
            if !keep(node) {
                node.position = placement.position;
            }
        }
    }
}

/// Lay out `nodes` according to `options`.
pub fn compute_layout(
    nodes: &[GraphNode],
    edges: &[GraphEdge],
    options: &LayoutOptions,
) -> Layout {
    if nodes.is_empty() {
        return Layout::default();
    }

    let ranks = match options.ranking {
        Ranking::ByKind => rank_by_kind(nodes),
        Ranking::LongestPath => rank_by_longest_path(nodes, edges).unwrap_or_else(|| {
            warn!("cycle in workflow graph, falling back to kind ranking");
            rank_by_kind(nodes)
        }),
    };

    let (cross_dim, main_dim) = match options.direction {
        Direction::TopToBottom => (options.node_width, options.node_height),
        Direction::LeftToRight => (options.node_height, options.node_width),
    };
    let anchors = options.direction.anchors();

    let mut slots: HashMap<usize, usize> = HashMap::new();
    let mut placements = HashMap::with_capacity(nodes.len());
    for (node, rank) in nodes.iter().zip(ranks) {
        let slot = slots.entry(rank).or_insert(0);
        let index = *slot;
        *slot += 1;

        // centre of the slot, then back to the top-left corner
        let cross = index as f64 * (cross_dim + options.node_spacing) + cross_dim / 2.0;
        let main = rank as f64 * (main_dim + options.rank_spacing) + main_dim / 2.0;
        let (cx, cy) = match options.direction {
            Direction::TopToBottom => (cross, main),
            Direction::LeftToRight => (main, cross),
        };

        placements.insert(
            node.id.clone(),
            Placement {
                position: Position::new(cx - options.node_width / 2.0, cy - options.node_height / 2.0),
                rank,
                anchors,
            },
        );
    }

    debug!(nodes = nodes.len(), ranks = slots.len(), direction = options.direction.as_ref(), "layout computed");
    Layout {
        placements,
    }
}

fn rank_by_kind(nodes: &[GraphNode]) -> Vec<usize> {
    nodes
        .iter()
        .map(|n| match n.kind() {
            NodeKind::Agent => 0,
            NodeKind::Task => 1,
        })
        .collect()
}

/// Longest-path ranking; `None` when the edges contain a cycle.
fn rank_by_longest_path(
    nodes: &[GraphNode],
    edges: &[GraphEdge],
) -> Option<Vec<usize>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(nodes.len(), edges.len());
    let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        index.insert(node.id.as_str(), graph.add_node(i));
    }

    for edge in edges {
        let (Some(&s), Some(&t)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) else {
            debug!(edge = %edge.id, "edge references a missing node, ignored by layout");
            continue;
        };
        let (s_kind, t_kind) = (nodes[graph[s]].kind(), nodes[graph[t]].kind());
        if s_kind == NodeKind::Task && t_kind == NodeKind::Agent {
            graph.add_edge(t, s, ());
        } else {
            graph.add_edge(s, t, ());
        }
    }

    let order = toposort(&graph, None).ok()?;
    let mut ranks = vec![0usize; nodes.len()];
    for idx in order {
        let rank = graph.neighbors_directed(idx, EdgeDirection::Incoming).map(|pred| ranks[graph[pred]] + 1).max().unwrap_or(0);
        ranks[graph[idx]] = rank;
    }
    Some(ranks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{EdgeOrigin, map_workflow},
        model::{Agent, Task},
    };

    fn crew_graph() -> crate::graph::Graph {
        let agents = vec![Agent::new("a1", "Researcher"), Agent::new("a2", "Writer")];
        let tasks = vec![
            Task::new("t1", "Collect sources").assigned_to("a1"),
            Task::new("t2", "Draft").assigned_to("a2"),
            Task::new("t3", "Review"),
        ];
        map_workflow(&agents, &tasks)
    }

    #[test]
    fn test_ranks_and_positions_top_to_bottom() {
        let graph = crew_graph();
        let layout = compute_layout(&graph.nodes, &graph.edges, &LayoutOptions::default());
        assert_eq!(layout.len(), 5);

        for id in ["agent-a1", "agent-a2"] {
            assert_eq!(layout.get(id).unwrap().rank, 0);
        }
        for id in ["task-t1", "task-t2", "task-t3"] {
            assert_eq!(layout.get(id).unwrap().rank, 1);
        }

        assert_eq!(layout.get("agent-a1").unwrap().position, Position::new(0.0, 0.0));
        assert_eq!(layout.get("agent-a2").unwrap().position, Position::new(340.0, 0.0));
        assert_eq!(layout.get("task-t3").unwrap().position, Position::new(680.0, 280.0));
        assert_eq!(layout.get("task-t1").unwrap().anchors.target, Side::Top);
    }

    #[test]
    fn test_left_to_right_swaps_axes() {
        let graph = crew_graph();
        let options = LayoutOptions {
            direction: Direction::LeftToRight,
            ..Default::default()
        };
        let layout = compute_layout(&graph.nodes, &graph.edges, &options);
        assert_eq!(layout.get("agent-a2").unwrap().position, Position::new(0.0, 260.0));
        assert_eq!(layout.get("task-t1").unwrap().position, Position::new(360.0, 0.0));
        assert_eq!(layout.get("task-t1").unwrap().anchors.source, Side::Right);
    }

    #[test]
    fn test_deterministic_and_no_overlap() {
        let graph = crew_graph();
        let options = LayoutOptions::default();
        let first = compute_layout(&graph.nodes, &graph.edges, &options);
        let second = compute_layout(&graph.nodes, &graph.edges, &options);
        assert_eq!(first, second);

        let placements: Vec<&Placement> = first.iter().map(|(_, p)| p).collect();
        for (i, a) in placements.iter().enumerate() {
            for b in placements.iter().skip(i + 1) {
                if a.rank == b.rank {
                    assert!((a.position.x - b.position.x).abs() >= options.node_width);
                }
            }
        }
    }

    #[test]
    fn test_empty_graph() {
        let layout = compute_layout(&[], &[], &LayoutOptions::default());
        assert!(layout.is_empty());
    }

    #[test]
    fn test_missing_endpoint_edge_is_dropped() {
        let mut graph = crew_graph();
        graph.edges.push(GraphEdge::new("agent-zz", "task-t1", EdgeOrigin::Drawn));
        let options = LayoutOptions {
            ranking: Ranking::LongestPath,
            ..Default::default()
        };
        let layout = compute_layout(&graph.nodes, &graph.edges, &options);
        assert_eq!(layout.len(), 5);
    }

    #[test]
    fn test_longest_path_orients_task_to_agent_edges() {
        let mut graph = crew_graph();
        graph.edges.retain(|e| e.id != "agent-a1-task-t1");
        graph.edges.push(GraphEdge::new("task-t1", "agent-a1", EdgeOrigin::Drawn));
        let options = LayoutOptions {
            ranking: Ranking::LongestPath,
            ..Default::default()
        };
        let layout = compute_layout(&graph.nodes, &graph.edges, &options);
        assert_eq!(layout.get("agent-a1").unwrap().rank, 0);
        assert_eq!(layout.get("task-t1").unwrap().rank, 1);
        // orphan task has no predecessor
        assert_eq!(layout.get("task-t3").unwrap().rank, 0);
    }

    #[test]
    fn test_apply_keeps_pinned() {
        let mut graph = crew_graph();
        graph.nodes[0].position = Position::new(5.0, 5.0);
        graph.nodes[0].pinned = true;
        let layout = compute_layout(&graph.nodes, &graph.edges, &LayoutOptions::default());
        layout.apply(&mut graph.nodes, |n| n.pinned);
        assert_eq!(graph.nodes[0].position, Position::new(5.0, 5.0));
        assert_eq!(graph.nodes[1].position, Position::new(340.0, 0.0));
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("LR".parse::<Direction>().unwrap(), Direction::LeftToRight);
        assert_eq!("top-to-bottom".parse::<Direction>().unwrap(), Direction::TopToBottom);
        assert_eq!(Direction::LeftToRight.to_string(), "left-to-right");
    }
}
