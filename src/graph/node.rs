use serde::{Deserialize, Serialize};

use crate::model::{Agent, Task};

/// node id
pub type NodeId = String;

const TASK_LABEL_LEN: usize = 50;

/// Kind of a graph node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    Agent,
    Task,
}

/// Execution status shown on a node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Top-left corner of a node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            x,
            y,
        }
    }
}

/// Side of a node where connections attach.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
}

/// Connection anchors of a node: outgoing edges leave from `source`,
/// incoming edges arrive at `target`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchors {
    pub source: Side,
    pub target: Side,
}

impl Default for Anchors {
    fn default() -> Self {
        Self {
            source: Side::Bottom,
            target: Side::Top,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AgentNodeData {
    pub name: String,
    pub role: String,
    pub has_memory: bool,
    pub can_delegate: bool,
    pub tools: Vec<String>,
}

impl From<&Agent> for AgentNodeData {
    fn from(agent: &Agent) -> Self {
        Self {
            name: agent.name.clone(),
            role: agent.role.clone(),
            has_memory: agent.memory,
            can_delegate: agent.allow_delegation,
            tools: agent.tools.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TaskNodeData {
    pub description: String,
    pub expected_output: String,
    pub output_file: Option<String>,
    pub async_execution: bool,
    /// name of the assigned agent, resolved from the current agent list
    pub agent_name: Option<String>,
    /// template variables found in the task text
    pub variables: Vec<String>,
}

impl TaskNodeData {
    pub fn from_task(
        task: &Task,
        agent_name: Option<String>,
    ) -> Self {
        Self {
            description: task.description.clone(),
            expected_output: task.expected_output.clone(),
            output_file: if task.output_file.is_empty() { None } else { Some(task.output_file.clone()) },
            async_execution: task.async_execution,
            agent_name,
            variables: task.variables(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeData {
    Agent(AgentNodeData),
    Task(TaskNodeData),
}

/// A node of the workflow graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// node id, `agent-{ref_id}` or `task-{ref_id}`
    pub id: NodeId,
    /// id of the source record
    pub ref_id: String,
    /// content derived from the source record
    pub data: NodeData,
    /// execution status overlay
    #[serde(default)]
    pub status: ExecutionStatus,
    /// top-left corner
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub anchors: Anchors,
    /// set once the user moved the node; automatic layout leaves it alone
    #[serde(default)]
    pub pinned: bool,
}

impl GraphNode {
    pub fn agent(agent: &Agent) -> Self {
        Self::new(agent_node_id(&agent.id), agent.id.clone(), NodeData::Agent(AgentNodeData::from(agent)))
    }

    pub fn task(
        task: &Task,
        agent_name: Option<String>,
    ) -> Self {
        Self::new(task_node_id(&task.id), task.id.clone(), NodeData::Task(TaskNodeData::from_task(task, agent_name)))
    }

    fn new(
        id: NodeId,
        ref_id: String,
        data: NodeData,
    ) -> Self {
        Self {
            id,
            ref_id,
            data,
            status: ExecutionStatus::Idle,
            position: Position::default(),
            anchors: Anchors::default(),
            pinned: false,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Agent(_) => NodeKind::Agent,
            NodeData::Task(_) => NodeKind::Task,
        }
    }

    /// Short display label: the agent name, or the first characters of the task description.
    pub fn label(&self) -> String {
        match &self.data {
            NodeData::Agent(a) => a.name.clone(),
            NodeData::Task(t) => {
                if t.description.chars().count() > TASK_LABEL_LEN {
                    format!("{}...", t.description.chars().take(TASK_LABEL_LEN).collect::<String>())
                } else {
                    t.description.clone()
                }
            }
        }
    }

    pub fn as_agent(&self) -> Option<&AgentNodeData> {
        match &self.data {
            NodeData::Agent(a) => Some(a),
            NodeData::Task(_) => None,
        }
    }

    pub fn as_task(&self) -> Option<&TaskNodeData> {
        match &self.data {
            NodeData::Task(t) => Some(t),
            NodeData::Agent(_) => None,
        }
    }
}

pub fn agent_node_id(agent_id: &str) -> NodeId {
    format!("agent-{}", agent_id)
}

pub fn task_node_id(task_id: &str) -> NodeId {
    format!("task-{}", task_id)
}
