use serde_json::json;
use tracing::info;

use hearth_core::{EventKind, ToolCallStatus};
use hearth_logging::{AgentEvent, EventLogger};

use crate::stages::Services;
use crate::state::AgentState;

pub async fn run(services: &Services, state: &mut AgentState) {
    state.tool_calls.clear();
    let Some(plan) = &state.action_plan else {
        state.error = Some("No action plan to execute".into());
        return;
    };

    let report = services.executor.execute(plan).await;
    for call in &report.tool_calls {
        EventLogger::log_event(
            &state.session_id,
            AgentEvent::ToolCall {
                tool_name: call.name.clone(),
                arguments_json: call.parameters.to_string(),
            },
        );
        let (kind, payload) = match call.status {
            ToolCallStatus::Complete => (
                EventKind::ActionExecuted,
                json!({ "call_id": call.id, "tool": call.name }),
            ),
            _ => (
                EventKind::ActionFailed,
                json!({ "call_id": call.id, "tool": call.name, "error": call.error }),
            ),
        };
        services.record(&state.session_id, kind, payload).await;
    }

    info!(
        calls = report.tool_calls.len(),
        aborted = report.error.is_some(),
        "Plan executed"
    );
    if let Some(e) = report.error {
        state.error = Some(e.to_string());
    }
    state.tool_calls = report.tool_calls;
}
