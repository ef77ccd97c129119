use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::model::id;

/// run id
pub type RunId = String;

/// Status of an external run.
///
/// The workflow api also reports `created`/`pending` before a run is picked up
/// and `error` or `cancelled` when a run ends badly; these are folded into the
/// three states below. Any other status keeps the run `Running`, so polling
/// goes on until a terminal status or the poll budget ends it.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Fold a status string reported by the run service.
    pub fn from_reported(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "completed" | "succeeded" | "success" => RunStatus::Completed,
            "failed" | "error" | "cancelled" | "canceled" | "aborted" | "stopped" | "timeout" | "timed_out" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let status = String::deserialize(deserializer)?;
        Ok(RunStatus::from_reported(&status))
    }
}

/// One execution attempt of a workflow, as reported by the run service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRun {
    #[serde(deserialize_with = "id::deserialize")]
    pub id: RunId,
    pub status: RunStatus,
    #[serde(default, alias = "logs", deserialize_with = "id::deserialize_nullable_string")]
    pub log: String,
    #[serde(default, alias = "output_payload", skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, alias = "error_message", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRun {
    pub fn new(
        id: impl Into<RunId>,
        status: RunStatus,
    ) -> Self {
        Self {
            id: id.into(),
            status,
            ..Default::default()
        }
    }

    pub fn with_log(
        mut self,
        log: impl Into<String>,
    ) -> Self {
        self.log = log.into();
        self
    }

    pub fn with_error(
        mut self,
        error: impl Into<String>,
    ) -> Self {
        self.error = Some(error.into());
        self
    }

    /// The `result` string of the output payload, if the run produced one.
    pub fn result_text(&self) -> Option<&str> {
        self.output.as_ref().and_then(|o| o.get("result")).and_then(|r| r.as_str())
    }
}

/// Payload sent to start a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub inputs: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl RunRequest {
    pub fn new(inputs: HashMap<String, serde_json::Value>) -> Self {
        Self {
            inputs,
            language: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_from_api_json() {
        let json = r#"{
            "id": 12,
            "project_id": 1,
            "status": "error",
            "input_payload": {},
            "output_payload": {"result": "done"},
            "logs": null,
            "error_message": "boom"
        }"#;
        let run: ExecutionRun = serde_json::from_str(json).unwrap();
        assert_eq!(run.id, "12");
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.log, "");
        assert_eq!(run.result_text(), Some("done"));
        assert_eq!(run.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_status_aliases() {
        let s: RunStatus = serde_json::from_str(r#""created""#).unwrap();
        assert_eq!(s, RunStatus::Running);
        assert!(!s.is_terminal());
        let s: RunStatus = serde_json::from_str(r#""completed""#).unwrap();
        assert!(s.is_terminal());
        assert_eq!(s.as_ref(), "completed");
    }

    #[test]
    fn test_unlisted_statuses_still_parse() {
        let run: ExecutionRun = serde_json::from_str(r#"{"id": 1, "status": "cancelled"}"#).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.status.is_terminal());

        let s: RunStatus = serde_json::from_str(r#""Succeeded""#).unwrap();
        assert_eq!(s, RunStatus::Completed);

        let s: RunStatus = serde_json::from_str(r#""warming_up""#).unwrap();
        assert_eq!(s, RunStatus::Running);
        assert!(!s.is_terminal());
    }
}
