//! Per-turn aggregate carried through the pipeline.

use serde::Serialize;
use serde_json::{Map, Value};

use hearth_core::{
    ActionPlan, ApprovalRequest, Intent, Message, Pattern, Role, Suggestion, ToolCall,
};

use crate::stage::Stage;

/// Conversation state for one session.
///
/// `messages` is append-only across turns; everything else describes the
/// current turn and is reset when a new message arrives.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub current_message: Option<String>,
    pub intent: Option<Intent>,
    pub action_plan: Option<ActionPlan>,
    /// Replaced on every execution.
    pub tool_calls: Vec<ToolCall>,
    pub pending_approval: Option<ApprovalRequest>,
    pub context: Map<String, Value>,
    pub detected_patterns: Vec<Pattern>,
    pub suggestions: Vec<Suggestion>,
    pub next_stage: Option<Stage>,
    pub should_continue: bool,
    pub error: Option<String>,
    /// Stages entered this turn, in order.
    pub trace: Vec<Stage>,
    /// Index into `messages` where the current turn begins.
    turn_start: usize,
}

impl AgentState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            current_message: None,
            intent: None,
            action_plan: None,
            tool_calls: Vec::new(),
            pending_approval: None,
            context: Map::new(),
            detected_patterns: Vec::new(),
            suggestions: Vec::new(),
            next_stage: None,
            should_continue: false,
            error: None,
            trace: Vec::new(),
            turn_start: 0,
        }
    }

    /// Start a fresh turn for a new user message. Any unanswered approval
    /// from the previous turn is dropped.
    pub fn begin_turn(&mut self, message: &str) {
        self.turn_start = self.messages.len();
        self.messages.push(Message::user(message));
        self.current_message = Some(message.to_string());
        self.intent = None;
        self.action_plan = None;
        self.pending_approval = None;
        self.context.clear();
        self.reset_outcome();
    }

    /// Start a continuation turn after an approval decision. Intent, plan,
    /// context and the (now resolved) approval carry over.
    pub fn begin_resume(&mut self) {
        self.turn_start = self.messages.len();
        self.reset_outcome();
    }

    fn reset_outcome(&mut self) {
        self.tool_calls.clear();
        self.detected_patterns.clear();
        self.suggestions.clear();
        self.next_stage = None;
        self.should_continue = true;
        self.error = None;
        self.trace.clear();
    }

    pub fn turn_messages(&self) -> &[Message] {
        &self.messages[self.turn_start.min(self.messages.len())..]
    }

    /// The assistant reply produced during this turn, if any.
    pub fn turn_reply(&self) -> Option<&Message> {
        self.turn_messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.is_empty())
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Pending approval that is still waiting on the user.
    pub fn awaiting_approval(&self) -> Option<&ApprovalRequest> {
        self.pending_approval.as_ref().filter(|a| a.is_pending())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{IntentCategory, RiskLevel};

    #[test]
    fn test_begin_turn_resets_per_turn_fields() {
        let mut state = AgentState::new("s1");
        state.begin_turn("hello");
        state.intent = Some(Intent::new(IntentCategory::Greeting, 0.9));
        state.error = Some("boom".into());
        state.push_assistant("Hi!");
        assert_eq!(state.turn_reply().unwrap().content, "Hi!");

        state.begin_turn("list files");
        assert!(state.intent.is_none());
        assert!(state.error.is_none());
        assert!(state.should_continue);
        assert!(state.turn_reply().is_none());
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.turn_messages().len(), 1);
        assert_eq!(state.current_message.as_deref(), Some("list files"));
    }

    #[test]
    fn test_resume_keeps_plan_and_approval() {
        let mut state = AgentState::new("s1");
        state.begin_turn("delete tmp");
        let plan = ActionPlan::new("Delete tmp", Vec::new(), RiskLevel::High);
        state.pending_approval = Some(ApprovalRequest::for_plan(&plan));
        state.action_plan = Some(plan);
        state.push_assistant("Do you approve these actions?");

        state.begin_resume();
        assert!(state.action_plan.is_some());
        assert!(state.awaiting_approval().is_some());
        assert!(state.turn_reply().is_none());
        assert_eq!(state.current_message.as_deref(), Some("delete tmp"));
    }
}
