use serde_json::json;
use tracing::info;

use hearth_core::{ApprovalRequest, EventKind};

use crate::stages::Services;
use crate::state::AgentState;

pub const DENIED_REPLY: &str =
    "I understand. I won't proceed with that action. Is there something else I can help you with?";

/// Gate the plan behind an approval when it needs confirmation. A decision
/// already on the state (from a resumed turn) is kept as is.
pub async fn run(services: &Services, state: &mut AgentState) {
    let Some(plan) = &state.action_plan else {
        state.pending_approval = None;
        return;
    };
    if !plan.requires_confirmation {
        state.pending_approval = None;
        return;
    }

    match &state.pending_approval {
        Some(approval) if approval.denied() => {
            info!(approval_id = %approval.id, "Plan denied by user");
            state.push_assistant(DENIED_REPLY);
        }
        Some(approval) if approval.approved() => {
            info!(approval_id = %approval.id, "Plan approved by user");
        }
        _ => {
            let approval = ApprovalRequest::for_plan(plan);
            info!(
                approval_id = %approval.id,
                risk = %approval.risk_level,
                steps = approval.steps.len(),
                "Approval required"
            );
            services
                .record(
                    &state.session_id,
                    EventKind::ApprovalRequested,
                    json!({
                        "approval_id": approval.id,
                        "action": approval.action,
                        "risk_level": approval.risk_level,
                    }),
                )
                .await;
            state.pending_approval = Some(approval);
        }
    }
}
