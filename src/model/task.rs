use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::id;

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").unwrap());

/// A unit of work as stored by the workflow api.
///
/// `agent_id` is the foreign key of the assigned agent. An empty string means
/// the task is not assigned to anybody.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    #[serde(default, deserialize_with = "id::deserialize")]
    pub project_id: String,
    #[serde(default, deserialize_with = "id::deserialize")]
    pub agent_id: String,
    pub description: String,
    #[serde(default, deserialize_with = "id::deserialize_nullable_string")]
    pub expected_output: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub async_execution: bool,
    #[serde(default, deserialize_with = "id::deserialize_nullable_string")]
    pub output_file: String,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn assigned_to(
        mut self,
        agent_id: impl Into<String>,
    ) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Id of the assigned agent, `None` when unassigned.
    pub fn assigned_agent(&self) -> Option<&str> {
        if self.agent_id.is_empty() { None } else { Some(&self.agent_id) }
    }

    /// Template variables (`{name}` placeholders) used by the description and
    /// the expected output, in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut vars: Vec<String> = Vec::new();
        for text in [&self.description, &self.expected_output] {
            for cap in VARIABLE_RE.captures_iter(text) {
                let name = cap[1].trim().to_string();
                if !name.is_empty() && !vars.contains(&name) {
                    vars.push(name);
                }
            }
        }
        vars
    }
}

/// Partial update sent to the workflow api when a connection is drawn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl TaskUpdate {
    pub fn assign(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
        }
    }
}
