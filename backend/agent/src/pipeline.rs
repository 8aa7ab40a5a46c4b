use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use hearth_core::{ApprovalRequest, EventKind, HearthError, Suggestion, ToolCall, ToolRegistry};
use hearth_executor::PlanExecutor;
use hearth_learning::Learner;
use hearth_llm::GenerationGateway;
use hearth_logging::{AgentEvent, EventLogger};
use hearth_storage::{ActionLog, PreferenceStore, VectorStore};

use crate::stage::{MAX_TRANSITIONS, Stage};
use crate::stages::{self, Services};
use crate::state::AgentState;

/// Receives answer tokens as they are generated.
pub type TokenSink = tokio::sync::mpsc::UnboundedSender<String>;

/// What a caller gets back from one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub session_id: String,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// Set only while the approval is still waiting on the user.
    pub pending_approval: Option<ApprovalRequest>,
    pub suggestions: Vec<Suggestion>,
    pub trace: Vec<Stage>,
}

impl TurnResult {
    fn from_state(state: &AgentState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            content: state
                .turn_reply()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            tool_calls: state.tool_calls.clone(),
            pending_approval: state.awaiting_approval().cloned(),
            suggestions: state.suggestions.clone(),
            trace: state.trace.clone(),
        }
    }
}

/// The staged decision machine. Stateless between turns apart from its
/// collaborators; per-session state lives in [`AgentState`].
pub struct DecisionPipeline {
    services: Services,
}

impl DecisionPipeline {
    pub fn new(gateway: Arc<GenerationGateway>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            services: Services {
                gateway,
                executor: PlanExecutor::new(registry),
                learner: None,
                action_log: None,
                preferences: None,
                vectors: None,
                assistant_name: "Hearth".to_string(),
            },
        }
    }

    pub fn with_learner(mut self, learner: Arc<Learner>) -> Self {
        self.services.learner = Some(learner);
        self
    }

    pub fn with_action_log(mut self, log: Arc<dyn ActionLog>) -> Self {
        self.services.action_log = Some(log);
        self
    }

    pub fn with_preferences(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.services.preferences = Some(store);
        self
    }

    pub fn with_vectors(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.services.vectors = Some(store);
        self
    }

    pub fn with_assistant_name(mut self, name: impl Into<String>) -> Self {
        self.services.assistant_name = name.into();
        self
    }

    pub fn gateway(&self) -> &Arc<GenerationGateway> {
        &self.services.gateway
    }

    pub fn executor(&self) -> &PlanExecutor {
        &self.services.executor
    }

    pub fn learner(&self) -> Option<&Arc<Learner>> {
        self.services.learner.as_ref()
    }

    /// Run one user turn to completion. Always yields a reply; failures
    /// surface as reply text.
    #[instrument(skip(self, state, message, sink), fields(session_id = %state.session_id))]
    pub async fn process_message(
        &self,
        state: &mut AgentState,
        message: &str,
        sink: Option<&TokenSink>,
    ) -> TurnResult {
        state.begin_turn(message);
        EventLogger::log_event(
            &state.session_id,
            AgentEvent::Message {
                role: "user".into(),
                content: message.to_string(),
            },
        );
        self.services
            .record(
                &state.session_id,
                EventKind::TurnStarted,
                json!({ "message": message }),
            )
            .await;
        self.run(state, Stage::IntentClassification, sink).await
    }

    /// Apply the user's decision to the pending approval and continue the
    /// turn from the permission check.
    #[instrument(skip(self, state, sink), fields(session_id = %state.session_id))]
    pub async fn resume_with_decision(
        &self,
        state: &mut AgentState,
        approval_id: &str,
        approved: bool,
        sink: Option<&TokenSink>,
    ) -> Result<TurnResult, HearthError> {
        let approval = state
            .pending_approval
            .as_mut()
            .filter(|a| a.is_pending())
            .ok_or_else(|| HearthError::ApprovalNotPending(approval_id.to_string()))?;
        if approval.id != approval_id {
            return Err(HearthError::ApprovalNotPending(approval_id.to_string()));
        }
        approval.resolve(approved);
        info!(approval_id, approved, "Approval resolved");

        state.begin_resume();
        self.services
            .record(
                &state.session_id,
                EventKind::ApprovalResolved,
                json!({ "approval_id": approval_id, "approved": approved }),
            )
            .await;
        Ok(self.run(state, Stage::PermissionCheck, sink).await)
    }

    async fn run(&self, state: &mut AgentState, start: Stage, sink: Option<&TokenSink>) -> TurnResult {
        let mut stage = start;
        loop {
            state.trace.push(stage);
            state.next_stage = Some(stage);
            EventLogger::log_event(
                &state.session_id,
                AgentEvent::StageEntered {
                    stage: stage.to_string(),
                },
            );

            stages::run(stage, &self.services, state, sink).await;

            let Some(next) = stage.next(state) else {
                break;
            };
            stage = if state.trace.len() >= MAX_TRANSITIONS && next != Stage::ResponseGeneration {
                warn!(transitions = state.trace.len(), "Transition limit reached");
                state
                    .error
                    .get_or_insert_with(|| "Too many stage transitions".to_string());
                Stage::ResponseGeneration
            } else {
                next
            };
        }
        state.next_stage = None;
        state.should_continue = false;

        let result = TurnResult::from_state(state);
        let kind = if state.error.is_some() {
            EventKind::TurnFailed
        } else {
            EventKind::TurnCompleted
        };
        if let Some(error) = &state.error {
            EventLogger::log_event(
                &state.session_id,
                AgentEvent::Error {
                    error_msg: error.clone(),
                },
            );
        }
        EventLogger::log_event(
            &state.session_id,
            AgentEvent::Message {
                role: "assistant".into(),
                content: result.content.clone(),
            },
        );
        self.services
            .record(
                &state.session_id,
                kind,
                json!({
                    "stages": result.trace,
                    "tool_calls": result.tool_calls.len(),
                    "pending_approval": result.pending_approval.is_some(),
                }),
            )
            .await;
        info!(stages = result.trace.len(), tools = result.tool_calls.len(), "Turn finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{Event, IntentCategory, Role, ToolCallStatus};
    use hearth_llm::providers::mock::MockBackend;
    use hearth_security::PathPolicy;
    use hearth_storage::{InMemoryActionLog, InMemoryVectorStore, RelationshipStore};
    use hearth_tools::{ToolPolicy, default_registry};

    fn intent_json(category: &str, confidence: f64) -> String {
        json!({
            "intent": category,
            "confidence": confidence,
            "risk_level": "low",
            "requires_approval": false,
            "entities": {},
            "explanation": "test"
        })
        .to_string()
    }

    fn plan_json(steps: serde_json::Value, risk: &str) -> String {
        json!({
            "plan_summary": "Test plan",
            "steps": steps,
            "total_risk_level": risk,
            "requires_user_confirmation": false
        })
        .to_string()
    }

    async fn pipeline(mock: MockBackend, dir: &std::path::Path) -> DecisionPipeline {
        let gateway = Arc::new(GenerationGateway::new(Arc::new(mock)));
        gateway.initialize().await.unwrap();
        let policy = ToolPolicy {
            paths: PathPolicy::new([dir.display().to_string()]),
            ..ToolPolicy::default()
        };
        DecisionPipeline::new(gateway, Arc::new(default_registry(policy)))
    }

    fn path_str(dir: &std::path::Path, name: &str) -> String {
        dir.join(name).display().to_string()
    }

    #[tokio::test]
    async fn test_greeting_skips_planning() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new("mock").with_response(intent_json("GREETING", 0.95));
        let pipeline = pipeline(mock, dir.path()).await.with_assistant_name("Ember");
        let mut state = AgentState::new("s1");

        let result = pipeline.process_message(&mut state, "hi there", None).await;
        assert_eq!(
            result.content,
            "Hello! I'm Ember, your desktop AI assistant. How can I help you today?"
        );
        assert_eq!(
            result.trace,
            vec![Stage::IntentClassification, Stage::ResponseGeneration]
        );
        assert_eq!(state.messages.len(), 2);
        assert!(!state.should_continue);
    }

    #[tokio::test]
    async fn test_low_confidence_asks_for_clarification() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new("mock").with_response(intent_json("FILESYSTEM_DELETE", 0.4));
        let pipeline = pipeline(mock, dir.path()).await;
        let mut state = AgentState::new("s1");

        let result = pipeline.process_message(&mut state, "get rid of it", None).await;
        assert!(result.content.starts_with("I think you want me to perform a filesystem delete"));
        assert!(!result.trace.contains(&Stage::ActionPlanning));
        assert!(state.action_plan.is_none());
    }

    #[tokio::test]
    async fn test_read_runs_without_approval_and_learns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "remember the milk").unwrap();
        let file = path_str(dir.path(), "notes.txt");
        let steps = json!([
            {"step_number": 1, "tool": "filesystem_list", "parameters": {"path": dir.path()}, "description": "List"},
            {"step_number": 2, "tool": "filesystem_read", "parameters": {"path": file}, "description": "Read"}
        ]);
        let mock = MockBackend::new("mock")
            .with_response(intent_json("FILESYSTEM_READ", 0.9))
            .with_response(plan_json(steps, "low"));

        let learner = Arc::new(Learner::in_memory());
        let log = Arc::new(InMemoryActionLog::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let pipeline = pipeline(mock, dir.path())
            .await
            .with_learner(learner.clone())
            .with_action_log(log.clone())
            .with_vectors(vectors.clone());
        let mut state = AgentState::new("s1");

        let result = pipeline.process_message(&mut state, "read my notes", None).await;
        assert_eq!(
            result.trace,
            vec![
                Stage::IntentClassification,
                Stage::ContextGathering,
                Stage::ActionPlanning,
                Stage::ActionExecution,
                Stage::Learning,
                Stage::ResponseGeneration,
            ]
        );
        assert!(result.content.starts_with("I've completed your request."));
        assert!(result.content.contains("remember the milk"));
        assert_eq!(result.tool_calls.len(), 2);
        assert_eq!(result.tool_calls[1].id, "tool_2_filesystem_read");
        assert!(result.pending_approval.is_none());

        let reply = state.turn_reply().unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.tool_calls.as_ref().map(Vec::len), Some(2));

        assert_eq!(learner.detector().history_len(), 2);
        assert_eq!(vectors.count("actions").await.unwrap(), 1);

        let events: Vec<Event> = log.recent("s1", 50).await.unwrap();
        assert_eq!(events[0].kind, EventKind::TurnCompleted);
        assert!(events.iter().any(|e| e.kind == EventKind::PatternLearned));
        assert_eq!(
            events.iter().filter(|e| e.kind == EventKind::ActionExecuted).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_delete_waits_for_approval_then_resumes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.log"), "stale").unwrap();
        let target = path_str(dir.path(), "old.log");
        let steps = json!([
            {"step_number": 1, "tool": "filesystem_delete", "parameters": {"path": target}, "description": "Delete old.log"}
        ]);
        let mock = MockBackend::new("mock")
            .with_response(intent_json("FILESYSTEM_DELETE", 0.9))
            .with_response(plan_json(steps, "low"));
        let pipeline = pipeline(mock, dir.path()).await;
        let mut state = AgentState::new("s1");

        let first = pipeline.process_message(&mut state, "delete old.log", None).await;
        let approval = first.pending_approval.clone().expect("approval requested");
        assert_eq!(approval.steps, vec!["1. Delete old.log (filesystem_delete)".to_string()]);
        assert!(first.content.contains("**Risk Level**: HIGH"));
        assert!(first.tool_calls.is_empty());
        assert!(dir.path().join("old.log").exists());

        let err = pipeline
            .resume_with_decision(&mut state, "wrong-id", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, HearthError::ApprovalNotPending(_)));

        let second = pipeline
            .resume_with_decision(&mut state, &approval.id, true, None)
            .await
            .unwrap();
        assert_eq!(
            second.trace,
            vec![
                Stage::PermissionCheck,
                Stage::ActionExecution,
                Stage::Learning,
                Stage::ResponseGeneration,
            ]
        );
        assert_eq!(second.tool_calls[0].status, ToolCallStatus::Complete);
        assert!(!dir.path().join("old.log").exists());
        assert!(second.pending_approval.is_none());

        // already resolved
        assert!(pipeline
            .resume_with_decision(&mut state, &approval.id, true, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_denied_approval_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = path_str(dir.path(), "out.txt");
        let steps = json!([
            {"step_number": 1, "tool": "filesystem_write", "parameters": {"path": file, "content": "x"}}
        ]);
        let mock = MockBackend::new("mock")
            .with_response(intent_json("FILESYSTEM_WRITE", 0.9))
            .with_response(plan_json(steps, "medium"));
        let pipeline = pipeline(mock, dir.path()).await;
        let mut state = AgentState::new("s1");

        let first = pipeline.process_message(&mut state, "write out.txt", None).await;
        let approval = first.pending_approval.unwrap();
        let second = pipeline
            .resume_with_decision(&mut state, &approval.id, false, None)
            .await
            .unwrap();
        assert_eq!(second.content, crate::stages::permission::DENIED_REPLY);
        assert_eq!(
            second.trace,
            vec![Stage::PermissionCheck, Stage::ResponseGeneration]
        );
        assert!(!dir.path().join("out.txt").exists());
    }

    #[tokio::test]
    async fn test_high_risk_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let steps = json!([
            {"step_number": 1, "tool": "filesystem_list", "parameters": {"path": dir.path()}},
            {"step_number": 2, "tool": "filesystem_read", "parameters": {"path": "/etc/definitely-outside"}, "risk_level": "high"},
            {"step_number": 3, "tool": "filesystem_list", "parameters": {"path": dir.path()}}
        ]);
        let mock = MockBackend::new("mock")
            .with_response(intent_json("FILESYSTEM_READ", 0.9))
            .with_response(plan_json(steps, "high"));
        let pipeline = pipeline(mock, dir.path()).await;
        let mut state = AgentState::new("s1");

        let first = pipeline.process_message(&mut state, "poke around", None).await;
        let approval = first.pending_approval.unwrap();
        let result = pipeline
            .resume_with_decision(&mut state, &approval.id, true, None)
            .await
            .unwrap();

        assert_eq!(result.tool_calls.len(), 2);
        assert_eq!(result.tool_calls[0].status, ToolCallStatus::Complete);
        assert_eq!(result.tool_calls[1].status, ToolCallStatus::Error);
        assert!(result.content.starts_with("I encountered an error while processing your request:"));
        assert!(result.content.contains("Critical step failed"));
        assert!(!result.trace.contains(&Stage::Learning));
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_error_reply() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(GenerationGateway::new(Arc::new(MockBackend::new("mock").failing())));
        gateway.initialize().await.unwrap();
        let pipeline = DecisionPipeline::new(gateway, Arc::new(default_registry(ToolPolicy {
            paths: PathPolicy::new([dir.path().display().to_string()]),
            ..ToolPolicy::default()
        })));
        let mut state = AgentState::new("s1");

        let result = pipeline.process_message(&mut state, "hello", None).await;
        assert!(result.content.contains("**Error**: "));
        assert_eq!(
            result.trace,
            vec![
                Stage::IntentClassification,
                Stage::ClarificationCheck,
                Stage::ResponseGeneration
            ]
        );
    }

    #[tokio::test]
    async fn test_unparseable_plan_gives_unclear_reply() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new("mock")
            .with_response(intent_json("CODE_ANALYSIS", 0.8))
            .with_response("I would look at the code.");
        let pipeline = pipeline(mock, dir.path()).await;
        let mut state = AgentState::new("s1");

        let result = pipeline.process_message(&mut state, "explain main.rs", None).await;
        assert_eq!(result.content, crate::stages::response::UNCLEAR_REPLY);
        assert!(state.error.is_none());
        assert_eq!(state.intent.as_ref().unwrap().category, IntentCategory::CodeAnalysis);
    }

    #[tokio::test]
    async fn test_question_streams_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new("mock")
            .with_response(intent_json("QUESTION", 0.9))
            .with_response("Rust is a systems language.")
            .with_chunk_chars(5);
        let pipeline = pipeline(mock, dir.path()).await;
        let mut state = AgentState::new("s1");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let result = pipeline.process_message(&mut state, "what is rust?", Some(&tx)).await;
        drop(tx);
        let mut tokens = Vec::new();
        while let Some(token) = rx.recv().await {
            tokens.push(token);
        }
        assert!(tokens.len() > 1);
        assert_eq!(tokens.concat(), "Rust is a systems language.");
        assert_eq!(result.content, "Rust is a systems language.");
    }

    #[tokio::test]
    async fn test_stream_failure_after_tokens_fails_turn() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new("mock")
            .with_response(intent_json("QUESTION", 0.9))
            .with_response("Rust is a systems language.")
            .with_chunk_chars(8)
            .with_stream_error_after(1);
        let log = Arc::new(InMemoryActionLog::new());
        let pipeline = pipeline(mock, dir.path()).await.with_action_log(log.clone());
        let mut state = AgentState::new("s1");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let result = pipeline.process_message(&mut state, "what is rust?", Some(&tx)).await;
        drop(tx);
        let mut tokens = Vec::new();
        while let Some(token) = rx.recv().await {
            tokens.push(token);
        }

        assert!(result.content.starts_with("Rust is \n\nI encountered an error"));
        assert!(result.content.contains("stream interrupted"));
        assert_eq!(tokens.concat(), result.content);
        assert!(state.error.as_deref().unwrap().contains("stream interrupted"));

        let events: Vec<Event> = log.recent("s1", 50).await.unwrap();
        assert_eq!(events[0].kind, EventKind::TurnFailed);
    }

    #[tokio::test]
    async fn test_empty_answer_still_replies() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new("mock")
            .with_response(intent_json("QUESTION", 0.9))
            .with_response("")
            .with_response(intent_json("QUESTION", 0.9))
            .with_response("   ");
        let pipeline = pipeline(mock, dir.path()).await;
        let mut state = AgentState::new("s1");

        let result = pipeline.process_message(&mut state, "what is rust?", None).await;
        assert!(result.content.contains(crate::stages::response::EMPTY_ANSWER_ERROR));
        assert!(state.turn_reply().is_some());
        assert!(state.error.is_some());

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let result = pipeline.process_message(&mut state, "and cargo?", Some(&tx)).await;
        drop(tx);
        let mut streamed = String::new();
        while let Some(token) = rx.recv().await {
            streamed.push_str(&token);
        }
        assert!(result.content.contains(crate::stages::response::EMPTY_ANSWER_ERROR));
        assert_eq!(streamed, result.content);
    }

    #[tokio::test]
    async fn test_new_message_abandons_pending_approval() {
        let dir = tempfile::tempdir().unwrap();
        let steps = json!([{"tool": "terminal_execute", "parameters": {"command": "echo hi"}}]);
        let mock = MockBackend::new("mock")
            .with_response(intent_json("TERMINAL_COMMAND", 0.9))
            .with_response(plan_json(steps, "low"))
            .with_response(intent_json("GREETING", 0.9));
        let pipeline = pipeline(mock, dir.path()).await;
        let mut state = AgentState::new("s1");

        let first = pipeline.process_message(&mut state, "run echo", None).await;
        let approval = first.pending_approval.unwrap();
        pipeline.process_message(&mut state, "hey", None).await;
        assert!(state.pending_approval.is_none());
        assert!(pipeline
            .resume_with_decision(&mut state, &approval.id, true, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_repeated_turns_feed_suggestions() {
        let dir = tempfile::tempdir().unwrap();
        let steps = json!([
            {"tool": "filesystem_list", "parameters": {"path": dir.path()}},
            {"tool": "filesystem_list", "parameters": {"path": dir.path()}}
        ]);
        let mut mock = MockBackend::new("mock");
        for _ in 0..3 {
            mock = mock
                .with_response(intent_json("FILESYSTEM_READ", 0.9))
                .with_response(plan_json(steps.clone(), "low"));
        }
        let learner = Arc::new(Learner::in_memory());
        let pipeline = pipeline(mock, dir.path()).await.with_learner(learner.clone());
        let mut state = AgentState::new("s1");

        let mut last = None;
        for _ in 0..3 {
            last = Some(pipeline.process_message(&mut state, "list twice", None).await);
        }
        let result = last.unwrap();
        assert!(!state.detected_patterns.is_empty());
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.action == "filesystem_list"));
    }

    #[tokio::test]
    async fn test_graph_transitions_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let steps = json!([
            {"tool": "filesystem_list", "parameters": {"path": dir.path()}},
            {"tool": "filesystem_read", "parameters": {"path": "missing.txt"}}
        ]);
        let mock = MockBackend::new("mock")
            .with_response(intent_json("FILESYSTEM_READ", 0.9))
            .with_response(plan_json(steps, "low"));
        let graph = Arc::new(hearth_storage::InMemoryRelationshipStore::new());
        let learner = Arc::new(Learner::new(graph.clone()));
        let pipeline = pipeline(mock, dir.path()).await.with_learner(learner);
        let mut state = AgentState::new("s1");

        let result = pipeline.process_message(&mut state, "list and read", None).await;
        // the low-risk read failed, so only the list is learned
        assert!(result.content.starts_with("Here's what happened:"));
        assert!(graph.next_actions("filesystem_list", 0.0, 5).await.unwrap().is_empty());
    }
}
