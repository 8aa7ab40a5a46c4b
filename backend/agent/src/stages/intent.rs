use serde_json::json;
use tracing::{debug, info, warn};

use hearth_core::EventKind;

use crate::parse::parse_intent;
use crate::prompts::intent_prompt;
use crate::stages::Services;
use crate::state::AgentState;

/// Classify the current message. A blank message or a gateway failure
/// leaves the intent empty; only the latter sets an error.
pub async fn run(services: &Services, state: &mut AgentState) {
    state.intent = None;
    let message = state.current_message.clone().unwrap_or_default();
    if message.trim().is_empty() {
        debug!("Empty message, nothing to classify");
        return;
    }

    let reply = match services.gateway.generate(&intent_prompt(&message), None).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Intent classification failed");
            state.error = Some(e.to_string());
            return;
        }
    };

    let intent = parse_intent(&reply);
    info!(
        category = %intent.category,
        confidence = intent.confidence,
        risk = %intent.risk_level,
        "Intent classified"
    );
    services
        .record(
            &state.session_id,
            EventKind::IntentClassified,
            json!({
                "category": intent.category,
                "confidence": intent.confidence,
                "risk_level": intent.risk_level,
            }),
        )
        .await;
    state.intent = Some(intent);
}
