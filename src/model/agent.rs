use serde::{Deserialize, Serialize};

use crate::model::id;

/// A named AI worker as stored by the workflow api.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(deserialize_with = "id::deserialize")]
    pub id: String,
    #[serde(default, deserialize_with = "id::deserialize")]
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default, deserialize_with = "id::deserialize_nullable_string")]
    pub backstory: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub memory: bool,
    #[serde(default)]
    pub allow_delegation: bool,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_role(
        mut self,
        role: impl Into<String>,
    ) -> Self {
        self.role = role.into();
        self
    }
}
