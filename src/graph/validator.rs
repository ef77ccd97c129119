//! Connection rules between agent and task nodes.

use serde::{Deserialize, Serialize};

use crate::graph::{GraphNode, NodeKind};

pub const AGENT_TO_AGENT: &str = "agents cannot connect directly; use a task between them.";
pub const TASK_TO_TASK: &str = "tasks cannot connect directly; use an agent between them.";
pub const INVALID_CONNECTION: &str = "invalid connection type";

/// Outcome of checking a proposed connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionValidation {
    pub legal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConnectionValidation {
    fn legal() -> Self {
        Self {
            legal: true,
            reason: None,
        }
    }

    fn illegal(reason: &str) -> Self {
        Self {
            legal: false,
            reason: Some(reason.to_string()),
        }
    }
}

/// The domain mutation a legal connection stands for: the task gets the agent's id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub task_ref: String,
    pub agent_ref: String,
}

/// Decide whether an edge from a `source` node to a `target` node is legal.
///
/// Agent and task may be joined in either direction; same-kind pairs are rejected.
pub fn validate_connection(
    source: NodeKind,
    target: NodeKind,
) -> ConnectionValidation {
    match (source, target) {
        (NodeKind::Agent, NodeKind::Task) | (NodeKind::Task, NodeKind::Agent) => ConnectionValidation::legal(),
        (NodeKind::Agent, NodeKind::Agent) => ConnectionValidation::illegal(AGENT_TO_AGENT),
        (NodeKind::Task, NodeKind::Task) => ConnectionValidation::illegal(TASK_TO_TASK),
    }
}

/// Same as [`validate_connection`] for kinds that may be unknown, eg. an edge whose
/// endpoint was removed.
pub fn validate_kinds(
    source: Option<NodeKind>,
    target: Option<NodeKind>,
) -> ConnectionValidation {
    match (source, target) {
        (Some(s), Some(t)) => validate_connection(s, t),
        _ => ConnectionValidation::illegal(INVALID_CONNECTION),
    }
}

/// The assignment implied by joining `source` and `target`, regardless of draw direction.
pub fn implied_assignment(
    source: &GraphNode,
    target: &GraphNode,
) -> Option<Assignment> {
    let (agent, task) = match (source.kind(), target.kind()) {
        (NodeKind::Agent, NodeKind::Task) => (source, target),
        (NodeKind::Task, NodeKind::Agent) => (target, source),
        _ => return None,
    };
    Some(Assignment {
        task_ref: task.ref_id.clone(),
        agent_ref: agent.ref_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, Task};

    #[test]
    fn test_validator_symmetry() {
        assert!(validate_connection(NodeKind::Agent, NodeKind::Task).legal);
        assert!(validate_connection(NodeKind::Task, NodeKind::Agent).legal);
        assert!(!validate_connection(NodeKind::Agent, NodeKind::Agent).legal);
        assert!(!validate_connection(NodeKind::Task, NodeKind::Task).legal);
    }

    #[test]
    fn test_reasons() {
        assert_eq!(validate_connection(NodeKind::Agent, NodeKind::Agent).reason.as_deref(), Some(AGENT_TO_AGENT));
        assert_eq!(validate_connection(NodeKind::Task, NodeKind::Task).reason.as_deref(), Some(TASK_TO_TASK));
        assert_eq!(validate_connection(NodeKind::Agent, NodeKind::Task).reason, None);
        assert_eq!(validate_kinds(Some(NodeKind::Agent), None).reason.as_deref(), Some(INVALID_CONNECTION));
    }

    #[test]
    fn test_implied_assignment_ignores_direction() {
        let agent = GraphNode::agent(&Agent::new("a2", "Writer"));
        let task = GraphNode::task(&Task::new("t1", "Draft"), None);
        let expected = Assignment {
            task_ref: "t1".to_string(),
            agent_ref: "a2".to_string(),
        };
        assert_eq!(implied_assignment(&agent, &task), Some(expected.clone()));
        assert_eq!(implied_assignment(&task, &agent), Some(expected));
        assert_eq!(implied_assignment(&agent, &agent), None);
    }
}
