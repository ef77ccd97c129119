//! Events broadcast by an editing session.
//!
//! Every failure, warning and completion the user should see becomes a
//! [`Notice`]; graph mutations are announced with the new revision so that a
//! view can re-read the graph.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CrewGraphError, model::RunStatus, utils};

/// Severity of a notice.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A short user-visible message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
    /// Timestamp in milliseconds.
    pub timestamp: i64,
}

impl Notice {
    pub fn new(
        level: NoticeLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            timestamp: utils::time::time_millis(),
        }
    }

    pub fn info(
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(NoticeLevel::Info, title, message)
    }

    pub fn success(
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(NoticeLevel::Success, title, message)
    }

    pub fn warning(
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(NoticeLevel::Warning, title, message)
    }

    /// Validation failures are warnings, everything else is an error.
    pub fn from_error(
        title: impl Into<String>,
        err: &CrewGraphError,
    ) -> Self {
        let level = if err.is_user_error() { NoticeLevel::Warning } else { NoticeLevel::Error };
        Self::new(level, title, err.to_string())
    }
}

impl fmt::Display for Notice {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "[{}] {} {}: {}", utils::time::format_millis(self.timestamp), self.level, self.title, self.message)
    }
}

/// Top-level session event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Notice(Notice),
    /// The graph changed; `revision` is the editor revision after the change.
    GraphChanged { revision: u64 },
    /// The watched run reached a terminal status.
    RunFinished { run_id: String, status: RunStatus },
}

impl SessionEvent {
    pub fn as_notice(&self) -> Option<&Notice> {
        match self {
            SessionEvent::Notice(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.as_notice().is_some_and(|n| n.level == NoticeLevel::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_level_from_error() {
        let n = Notice::from_error("Connection", &CrewGraphError::Validation("nope".to_string()));
        assert_eq!(n.level, NoticeLevel::Warning);
        assert_eq!(n.message, "nope");

        let n = Notice::from_error("Connection", &CrewGraphError::Persistence("500".to_string()));
        assert_eq!(n.level, NoticeLevel::Error);
        assert_eq!(n.message, "failed to save connection: 500");
        assert!(n.timestamp > 0);

        let mut n = Notice::success("Run", "run 4 completed");
        n.timestamp = 0;
        assert_eq!(n.to_string(), "[1970-01-01 00:00:00] success Run: run 4 completed");
    }

    #[test]
    fn test_event_serialize() {
        let e = SessionEvent::GraphChanged {
            revision: 3,
        };
        assert_eq!(serde_json::to_value(&e).unwrap(), serde_json::json!({"type": "graph_changed", "revision": 3}));
        assert!(!e.is_error());
        assert_eq!("success".parse::<NoticeLevel>().unwrap(), NoticeLevel::Success);
    }
}
