use serde_json::json;
use tracing::{info, warn};

use hearth_core::{ActionPlan, EventKind, ToolRegistry};

use crate::parse::parse_plan;
use crate::prompts::planning_prompt;
use crate::stages::Services;
use crate::state::AgentState;

/// Raise step risk and approval flags to at least what the registered tool
/// declares, then recompute the plan-level risk and confirmation.
pub fn normalize_plan(plan: &mut ActionPlan, registry: &ToolRegistry) {
    for step in &mut plan.steps {
        if let Some(tool) = registry.get(&step.tool_name) {
            step.risk_level = step.risk_level.max(tool.risk_level());
            step.requires_approval |= tool.requires_approval();
        }
    }
    plan.total_risk_level = plan.total_risk_level.max(plan.max_step_risk());
    plan.enforce_confirmation();
}

pub async fn run(services: &Services, state: &mut AgentState) {
    state.action_plan = None;
    let Some(intent) = &state.intent else {
        state.error = Some("No intent to plan for".into());
        return;
    };
    let message = state.current_message.as_deref().unwrap_or_default();
    let registry = services.executor.registry();
    let prompt = planning_prompt(message, intent, &state.context, &registry.describe());

    let reply = match services.gateway.generate(&prompt, None).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Action planning failed");
            state.error = Some(e.to_string());
            return;
        }
    };

    let mut plan = match parse_plan(&reply) {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            warn!("Could not parse action plan reply");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Invalid JSON in action plan reply");
            state.error = Some(format!("JSON parse error: {e}"));
            return;
        }
    };
    normalize_plan(&mut plan, registry);

    info!(
        steps = plan.steps.len(),
        risk = %plan.total_risk_level,
        confirm = plan.requires_confirmation,
        "Action plan created"
    );
    services
        .record(
            &state.session_id,
            EventKind::PlanGenerated,
            json!({
                "summary": plan.summary,
                "tools": plan.steps.iter().map(|s| s.tool_name.as_str()).collect::<Vec<_>>(),
                "risk_level": plan.total_risk_level,
            }),
        )
        .await;
    state.action_plan = Some(plan);
}
