//! Edges connecting agent and task nodes.

use serde::{Deserialize, Serialize};

use crate::graph::node::NodeId;

/// Unique identifier for an edge within a graph.
pub type EdgeId = String;

/// Where an edge came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EdgeOrigin {
    /// Built from a task's `agent_id`.
    #[default]
    Derived,
    /// Drawn by the user in the editor.
    Drawn,
}

/// A directed edge between an agent node and a task node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// true while both endpoints are executing
    #[serde(default)]
    pub animated: bool,
    #[serde(default)]
    pub origin: EdgeOrigin,
}

impl GraphEdge {
    pub fn new(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        origin: EdgeOrigin,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: edge_id(&source, &target),
            source,
            target,
            animated: false,
            origin,
        }
    }

    /// Whether `nid` is one of the endpoints.
    pub fn touches(
        &self,
        nid: &str,
    ) -> bool {
        self.source == nid || self.target == nid
    }

    /// Whether the edge joins `a` and `b`, in either direction.
    pub fn joins(
        &self,
        a: &str,
        b: &str,
    ) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }

    /// The endpoint opposite to `nid`.
    pub fn other(
        &self,
        nid: &str,
    ) -> Option<&NodeId> {
        if self.source == nid {
            Some(&self.target)
        } else if self.target == nid {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Id of the edge from `source` to `target`.
///
/// Hyphens and backslashes inside the record part of each node id are
/// escaped, so ids like `agent-a-task-b` stay distinct from one another.
pub fn edge_id(
    source: &str,
    target: &str,
) -> EdgeId {
    let mut id = String::with_capacity(source.len() + target.len() + 1);
    push_escaped(&mut id, source);
    id.push('-');
    push_escaped(&mut id, target);
    id
}

fn push_escaped(
    out: &mut String,
    nid: &str,
) {
    let (prefix, rest) = ["agent-", "task-"]
        .iter()
        .find_map(|p| nid.strip_prefix(p).map(|rest| (*p, rest)))
        .unwrap_or(("", nid));
    out.push_str(prefix);
    for c in rest.chars() {
        if c == '-' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
}
