use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hearth_core::{EventKind, ToolCallStatus};
use hearth_storage::VectorPoint;

use crate::stages::Services;
use crate::state::AgentState;

/// Collection holding embeddings of messages that led to actions.
pub const ACTIONS_COLLECTION: &str = "actions";

/// Feed the completed tool calls into the learner and remember the message
/// that triggered them. Every side effect here is best-effort.
pub async fn run(services: &Services, state: &mut AgentState) {
    let Some(learner) = &services.learner else {
        return;
    };

    let actions: Vec<String> = state
        .tool_calls
        .iter()
        .filter(|c| c.status == ToolCallStatus::Complete)
        .map(|c| c.name.clone())
        .collect();
    let Some(last) = actions.last() else {
        debug!("No completed actions to learn from");
        return;
    };

    let context = json!({
        "intent": state.intent.as_ref().map(|i| i.category),
        "directory": state.context.get("current_directory").cloned().unwrap_or(Value::Null),
    });

    learner.observe(&actions, &context).await;
    state.detected_patterns = learner.detect_patterns();
    state.suggestions = learner.suggest(last, &context).await;

    info!(
        actions = actions.len(),
        patterns = state.detected_patterns.len(),
        suggestions = state.suggestions.len(),
        "Learned from turn"
    );
    services
        .record(
            &state.session_id,
            EventKind::PatternLearned,
            json!({
                "actions": actions,
                "patterns": state.detected_patterns.len(),
            }),
        )
        .await;

    remember_message(services, state, &actions).await;
}

async fn remember_message(services: &Services, state: &AgentState, actions: &[String]) {
    let (Some(vectors), Some(message)) = (&services.vectors, &state.current_message) else {
        return;
    };
    let vector = match services.gateway.embed(message).await {
        Ok(vector) => vector,
        Err(e) => {
            warn!(error = %e, "Skipping message embedding");
            return;
        }
    };
    let point = VectorPoint::new(
        Uuid::new_v4().to_string(),
        vector,
        json!({
            "session_id": state.session_id,
            "message": message,
            "actions": actions,
            "intent": state.intent.as_ref().map(|i| i.category),
        }),
    );
    if let Err(e) = vectors.upsert(ACTIONS_COLLECTION, point).await {
        warn!(error = %e, "Failed to store message embedding");
    }
}
