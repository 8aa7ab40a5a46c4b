use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One entry in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(calls);
        self
    }
}

/// Lifecycle of a single tool invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Complete,
    Error,
}

/// A tool invocation made while executing a plan.
///
/// Terminal once `status` is `Complete` or `Error`; the lifecycle methods
/// ignore transitions out of a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub parameters: Value,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCall {
    /// Build the call for the `n`th step of a run (ids look like `tool_1_filesystem_read`).
    pub fn new(n: usize, name: impl Into<String>, parameters: Value) -> Self {
        let name = name.into();
        Self {
            id: format!("tool_{}_{}", n, name),
            name,
            parameters,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ToolCallStatus::Complete | ToolCallStatus::Error)
    }

    pub fn start(&mut self) {
        if !self.is_terminal() {
            self.status = ToolCallStatus::Running;
        }
    }

    pub fn complete(&mut self, result: impl Into<String>) {
        if !self.is_terminal() {
            self.status = ToolCallStatus::Complete;
            self.result = Some(result.into());
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if !self.is_terminal() {
            self.status = ToolCallStatus::Error;
            self.error = Some(error.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
        assert!(!json.contains("tool_calls"));
    }

    #[test]
    fn test_tool_call_id_format() {
        let call = ToolCall::new(2, "filesystem_read", serde_json::json!({}));
        assert_eq!(call.id, "tool_2_filesystem_read");
        assert_eq!(call.status, ToolCallStatus::Pending);
    }

    #[test]
    fn test_tool_call_terminal_is_sticky() {
        let mut call = ToolCall::new(1, "terminal_execute", serde_json::json!({}));
        call.start();
        assert_eq!(call.status, ToolCallStatus::Running);
        call.fail("boom");
        call.complete("late result");
        assert_eq!(call.status, ToolCallStatus::Error);
        assert_eq!(call.error.as_deref(), Some("boom"));
        assert!(call.result.is_none());
    }
}
