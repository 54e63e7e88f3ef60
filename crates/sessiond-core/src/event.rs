//! Session lifecycle and progress events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Event pushed to the client side of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session was registered
    SessionStarted,

    /// Periodic state snapshot of an authenticated session
    SessionState {
        /// Last time the session was used
        last_accessed_at: DateTime<Utc>,
        /// Milliseconds left before idle eviction
        remaining_time_ms: u64,
        /// Whether the session is still usable
        valid: bool,
        /// Whether cached navigator state must be rebuilt
        cache_expired: bool,
        /// Client locale, if known
        locale: Option<String>,
        /// Pending UI action parameters
        action_parameters: BTreeMap<String, serde_json::Value>,
    },

    /// The session was closed by another actor
    SessionExpired,

    /// The session's user was deleted
    UserDeleted {
        /// Deleted user id
        user_id: String,
    },

    /// A (possibly nested) task began
    TaskStarted {
        /// Frame id
        task_id: usize,
        /// Task name
        name: String,
        /// Total units of work
        total_work: u32,
    },

    /// The active task entered a sub-task
    SubTaskStarted {
        /// Frame id
        task_id: usize,
        /// Sub-task name
        name: String,
    },

    /// Work was reported on the active task
    TaskProgress {
        /// Frame id
        task_id: usize,
        /// Accumulated units of work
        worked: u32,
        /// Total units of work
        total_work: u32,
    },

    /// A task frame finished
    TaskFinished {
        /// Frame id
        task_id: usize,
    },
}

/// Destination for session events.
///
/// `publish` must not block on slow consumers. Errors are reported back so
/// the registry can log them; they never abort registry operations.
pub trait EventSink: Send + Sync {
    /// Hand an event for `session_id` to the transport.
    fn publish(&self, session_id: &str, event: SessionEvent) -> Result<()>;
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _session_id: &str, _event: SessionEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = SessionEvent::TaskStarted {
            task_id: 0,
            name: "Load".to_string(),
            total_work: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_started");
        assert_eq!(json["total_work"], 10);
    }

    #[test]
    fn test_unit_event_serialization() {
        let json = serde_json::to_string(&SessionEvent::SessionExpired).unwrap();
        assert_eq!(json, r#"{"type":"session_expired"}"#);
    }

    #[test]
    fn test_event_roundtrip_user_deleted() {
        let event = SessionEvent::UserDeleted {
            user_id: "bob".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_noop_sink() {
        assert!(NoopEventSink
            .publish("s", SessionEvent::SessionStarted)
            .is_ok());
    }
}
