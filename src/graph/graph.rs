//! The node/edge collection owned by the editor.
//!
//! Nodes keep their insertion order (agents first, then tasks, as produced by
//! the mapper); the layout engine relies on that order to place nodes
//! deterministically within a rank.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::{
    edge::{EdgeId, GraphEdge},
    node::{GraphNode, NodeId},
};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Output a human-readable representation of the graph
    pub fn schema(&self) -> String {
        let mut lines = Vec::new();

        lines.push("=== Workflow Graph ===".to_string());
        lines.push(format!("Nodes: {}, Edges: {}", self.nodes.len(), self.edges.len()));
        lines.push(String::new());

        lines.push("--- Nodes ---".to_string());
        for node in &self.nodes {
            lines.push(format!(
                "[{}] {} (kind: {}, status: {}, at: {},{}{})",
                node.id,
                node.label(),
                node.kind().as_ref(),
                node.status.as_ref(),
                node.position.x,
                node.position.y,
                if node.pinned { ", pinned" } else { "" }
            ));
        }
        lines.push(String::new());

        lines.push("--- Edges ---".to_string());
        for edge in &self.edges {
            lines.push(format!(
                "{} --> {} (id: {}, origin: {}{})",
                edge.source,
                edge.target,
                edge.id,
                edge.origin.as_ref(),
                if edge.animated { ", animated" } else { "" }
            ));
        }

        lines.join("\n")
    }

    /// get node by id
    pub fn node(
        &self,
        id: &str,
    ) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// get mutable node by id
    pub fn node_mut(
        &mut self,
        id: &str,
    ) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// get edge by id
    pub fn edge(
        &self,
        id: &str,
    ) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn contains_node(
        &self,
        id: &str,
    ) -> bool {
        self.node(id).is_some()
    }

    /// get all node ids
    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// get all edge ids
    pub fn edge_ids(&self) -> BTreeSet<EdgeId> {
        self.edges.iter().map(|e| e.id.clone()).collect()
    }

    /// Edge joining `a` and `b` in either direction.
    pub fn edge_between(
        &self,
        a: &str,
        b: &str,
    ) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.joins(a, b))
    }

    /// All edges incident to `nid`.
    pub fn edges_of<'a>(
        &'a self,
        nid: &'a str,
    ) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.touches(nid))
    }

    /// add edge unless one with the same id exists; returns whether it was added
    pub fn add_edge(
        &mut self,
        edge: GraphEdge,
    ) -> bool {
        if self.edge(&edge.id).is_some() {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// remove edge by id
    pub fn remove_edge(
        &mut self,
        id: &str,
    ) -> Option<GraphEdge> {
        let idx = self.edges.iter().position(|e| e.id == id)?;
        Some(self.edges.remove(idx))
    }

    /// Remove the given nodes together with every edge touching them.
    pub fn remove_nodes(
        &mut self,
        ids: &BTreeSet<NodeId>,
    ) -> Vec<GraphNode> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.nodes).into_iter().partition(|n| ids.contains(&n.id));
        self.nodes = kept;
        self.edges.retain(|e| !ids.contains(&e.source) && !ids.contains(&e.target));
        removed
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }
}
