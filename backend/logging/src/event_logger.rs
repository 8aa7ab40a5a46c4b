//! Per-session agent events on the `agent_events` tracing target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StageEntered { stage: String },
    ToolCall { tool_name: String, arguments_json: String },
    Message { role: String, content: String },
    Error { error_msg: String },
}

impl AgentEvent {
    fn redacted(self) -> Self {
        match self {
            Self::ToolCall { tool_name, arguments_json } => Self::ToolCall {
                tool_name,
                arguments_json: redact_sensitive_data(&arguments_json),
            },
            Self::Message { role, content } => Self::Message {
                role,
                content: redact_sensitive_data(&content),
            },
            Self::Error { error_msg } => Self::Error {
                error_msg: redact_sensitive_data(&error_msg),
            },
            stage @ Self::StageEntered { .. } => stage,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventLogEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: AgentEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Redact and emit one event. Returns the entry that was logged.
    pub fn log_event(session_id: &str, event: AgentEvent) -> EventLogEntry {
        let entry = EventLogEntry {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            event: event.redacted(),
        };

        let record = serde_json::to_string(&entry).unwrap_or_else(|e| e.to_string());
        info!(target: "agent_events", session_id, event = %record, "Agent trace event");
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_content_redacted() {
        let entry = EventLogger::log_event(
            "s1",
            AgentEvent::Message {
                role: "user".into(),
                content: "call me at 555-123-4567".into(),
            },
        );
        match entry.event {
            AgentEvent::Message { content, .. } => assert!(content.contains("[REDACTED_PHONE]")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_stage_serialization() {
        let entry = EventLogger::log_event("s1", AgentEvent::StageEntered { stage: "action_planning".into() });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "stage_entered");
        assert_eq!(json["event"]["stage"], "action_planning");
    }
}
