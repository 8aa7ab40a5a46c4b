use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable record of something that happened during a turn.
/// These are what the action log stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

/// Categories of events that can occur during a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A user message entered the pipeline
    TurnStarted,
    /// The message was classified
    IntentClassified,
    /// Ambient context was collected
    ContextGathered,
    /// The planner produced a plan
    PlanGenerated,
    /// A plan is waiting on the user
    ApprovalRequested,
    /// The user approved or denied a plan
    ApprovalResolved,
    /// A tool call completed
    ActionExecuted,
    /// A tool call failed
    ActionFailed,
    /// Learning ran over a completed turn
    PatternLearned,
    /// The turn produced a response
    TurnCompleted,
    /// The turn ended with an error response
    TurnFailed,
}

impl Event {
    pub fn new(session_id: impl Into<String>, kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            kind,
            payload,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = Event::new(
            "session-1",
            EventKind::TurnStarted,
            serde_json::json!({"message": "hello"}),
        );
        assert_eq!(event.session_id, "session-1");
        assert_eq!(event.kind, EventKind::TurnStarted);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            "s",
            EventKind::ActionExecuted,
            serde_json::json!({"tool": "filesystem_read"}),
        );
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.kind, EventKind::ActionExecuted);
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::TurnStarted.to_string(), "turn_started");
        assert_eq!(EventKind::ApprovalResolved.to_string(), "approval_resolved");
    }
}
