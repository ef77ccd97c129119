//! Error types for crewgraph.
//!
//! All errors are represented by the `CrewGraphError` enum. Every variant
//! renders as a short, human-readable message that can be shown to the user
//! as-is; none of them is fatal to an editing session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all crewgraph operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum CrewGraphError {
    /// Illegal connection or graph shape. User-correctable, never a system fault.
    #[error("{0}")]
    Validation(String),

    /// A drawn connection could not be persisted to the workflow source.
    #[error("failed to save connection: {0}")]
    Persistence(String),

    /// The run service refused or could not be reached when starting a run.
    #[error("failed to start run: {0}")]
    RunStart(String),

    /// Fetching the status of the current run failed.
    #[error("failed to fetch run status: {0}")]
    Poll(String),

    /// Transport or HTTP level failure talking to an external service.
    #[error("{0}")]
    Client(String),

    /// Configuration parsing errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// Lookup of a node, edge or record that does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The editing session is closed or did not answer.
    #[error("{0}")]
    Session(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl CrewGraphError {
    /// Whether the error is caused by the user's input rather than a failing service.
    pub fn is_user_error(&self) -> bool {
        matches!(self, CrewGraphError::Validation(_))
    }
}

impl From<std::io::Error> for CrewGraphError {
    fn from(error: std::io::Error) -> Self {
        CrewGraphError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for CrewGraphError {
    fn from(error: serde_json::Error) -> Self {
        CrewGraphError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for CrewGraphError {
    fn from(error: toml::de::Error) -> Self {
        CrewGraphError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for CrewGraphError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => CrewGraphError::Client(format!("{} ({})", status, error.url().map(|u| u.path()).unwrap_or_default())),
            None => CrewGraphError::Client(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_into_crate_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "crewgraph.toml missing");
        assert_eq!(CrewGraphError::from(io), CrewGraphError::IoError("crewgraph.toml missing".to_string()));

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(CrewGraphError::from(json), CrewGraphError::Convert(_)));

        let toml = toml::from_str::<toml::Table>("polling = ").unwrap_err();
        assert!(matches!(CrewGraphError::from(toml), CrewGraphError::Config(_)));
    }

    #[test]
    fn test_user_error_display() {
        let err = CrewGraphError::Validation("tasks can only connect to agents".to_string());
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), "tasks can only connect to agents");
        assert!(!CrewGraphError::Poll("timeout".to_string()).is_user_error());
        assert_eq!(CrewGraphError::Poll("timeout".to_string()).to_string(), "failed to fetch run status: timeout");
    }
}
