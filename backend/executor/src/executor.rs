use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use hearth_core::{ActionPlan, HearthError, ToolCall, ToolOutput, ToolRegistry};

/// Result of running a plan: every call that was attempted, plus the
/// error that aborted the run, if any.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub tool_calls: Vec<ToolCall>,
    pub error: Option<HearthError>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs plan steps against the tool registry.
pub struct PlanExecutor {
    registry: Arc<ToolRegistry>,
}

impl PlanExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute steps strictly in plan order.
    ///
    /// A failing medium/high-risk step aborts the run immediately; a
    /// failing low-risk step is recorded and the run continues.
    pub async fn execute(&self, plan: &ActionPlan) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        info!(steps = plan.steps.len(), risk = %plan.total_risk_level, "Executing plan");

        for (i, step) in plan.steps.iter().enumerate() {
            let mut call = ToolCall::new(i + 1, &step.tool_name, step.parameters.clone());
            call.start();
            debug!(call_id = %call.id, "Step started");

            match self.invoke(&step.tool_name, step.parameters.clone()).await {
                Ok(output) => call.complete(output),
                Err(e) => {
                    let message = e.to_string();
                    call.fail(message.clone());
                    if step.risk_level.requires_confirmation() {
                        warn!(
                            call_id = %call.id,
                            risk = %step.risk_level,
                            error = %message,
                            "Critical step failed, aborting plan"
                        );
                        report.tool_calls.push(call);
                        report.error = Some(HearthError::CriticalStepFailed(message));
                        return report;
                    }
                    warn!(call_id = %call.id, error = %message, "Low-risk step failed, continuing");
                }
            }
            report.tool_calls.push(call);
        }

        report
    }

    /// Run one tool and return its raw output. Unexpected tool errors are
    /// folded into a failed `ToolOutput`.
    pub async fn execute_tool(&self, name: &str, params: Value) -> Result<ToolOutput, HearthError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| HearthError::ToolNotFound(name.to_string()))?;
        info!(tool = %name, "Executing tool");
        Ok(match tool.execute(params).await {
            Ok(output) => output,
            Err(e) => ToolOutput::err(e.to_string()),
        })
    }

    async fn invoke(&self, name: &str, params: Value) -> Result<String, HearthError> {
        let output = self.execute_tool(name, params).await?;
        if output.success {
            Ok(output.output.unwrap_or_default())
        } else {
            let message = output
                .error
                .unwrap_or_else(|| format!("{} failed", name));
            Err(HearthError::Other(anyhow::anyhow!(message)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hearth_core::{PlanStep, RiskLevel, Tool, ToolCallStatus};
    use serde_json::json;

    struct Scripted {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Tool for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "scripted"
        }
        fn parameters(&self) -> Value {
            json!({})
        }
        async fn execute(&self, _args: Value) -> anyhow::Result<ToolOutput> {
            if self.fail {
                Ok(ToolOutput::err(format!("{} broke", self.name)))
            } else {
                Ok(ToolOutput::ok(format!("{} ok", self.name)))
            }
        }
    }

    fn executor() -> PlanExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Scripted { name: "one", fail: false }));
        registry.register(Arc::new(Scripted { name: "two", fail: true }));
        registry.register(Arc::new(Scripted { name: "three", fail: false }));
        PlanExecutor::new(Arc::new(registry))
    }

    fn plan(second_risk: RiskLevel) -> ActionPlan {
        ActionPlan::new(
            "three steps",
            vec![
                PlanStep::new(1, "one", json!({})),
                PlanStep::new(2, "two", json!({})).with_risk(second_risk),
                PlanStep::new(3, "three", json!({})),
            ],
            RiskLevel::Low,
        )
    }

    #[tokio::test]
    async fn test_high_risk_failure_aborts_before_next_step() {
        let report = executor().execute(&plan(RiskLevel::High)).await;

        assert!(matches!(report.error, Some(HearthError::CriticalStepFailed(_))));
        assert_eq!(
            report.error.as_ref().unwrap().to_string(),
            "Critical step failed: two broke"
        );
        assert_eq!(report.tool_calls.len(), 2);
        assert_eq!(report.tool_calls[0].status, ToolCallStatus::Complete);
        assert_eq!(report.tool_calls[0].result.as_deref(), Some("one ok"));
        assert_eq!(report.tool_calls[1].status, ToolCallStatus::Error);
    }

    #[tokio::test]
    async fn test_low_risk_failure_continues() {
        let report = executor().execute(&plan(RiskLevel::Low)).await;

        assert!(report.is_success());
        assert_eq!(report.tool_calls.len(), 3);
        assert_eq!(report.tool_calls[1].error.as_deref(), Some("two broke"));
        assert_eq!(report.tool_calls[2].status, ToolCallStatus::Complete);
        assert_eq!(report.tool_calls[2].id, "tool_3_three");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let exec = executor();
        assert!(matches!(
            exec.execute_tool("missing", json!({})).await,
            Err(HearthError::ToolNotFound(_))
        ));

        let plan = ActionPlan::new(
            "bad",
            vec![PlanStep::new(1, "missing", json!({})).with_risk(RiskLevel::Medium)],
            RiskLevel::Medium,
        );
        let report = exec.execute(&plan).await;
        assert_eq!(
            report.error.unwrap().to_string(),
            "Critical step failed: tool not found: missing"
        );
    }
}
