use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::intent::RiskLevel;

/// One tool invocation proposed by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub index: usize,
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub description: String,
    /// Declarative only; steps always run in plan order.
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub requires_approval: bool,
}

impl PlanStep {
    pub fn new(index: usize, tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            index,
            tool_name: tool_name.into(),
            parameters,
            description: String::new(),
            depends_on: Vec::new(),
            risk_level: RiskLevel::Low,
            requires_approval: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    /// Line shown to the user when asking for approval.
    pub fn display_line(&self) -> String {
        let description = if self.description.is_empty() {
            self.tool_name.as_str()
        } else {
            self.description.as_str()
        };
        format!("{}. {} ({})", self.index, description, self.tool_name)
    }
}

/// Ordered list of tool invocations satisfying an intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionPlan {
    pub summary: String,
    pub steps: Vec<PlanStep>,
    pub total_risk_level: RiskLevel,
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_message: Option<String>,
}

impl ActionPlan {
    pub fn new(summary: impl Into<String>, steps: Vec<PlanStep>, total_risk_level: RiskLevel) -> Self {
        let mut plan = Self {
            summary: summary.into(),
            steps,
            total_risk_level,
            requires_confirmation: false,
            confirmation_message: None,
        };
        plan.enforce_confirmation();
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn max_step_risk(&self) -> RiskLevel {
        self.steps
            .iter()
            .map(|s| s.risk_level)
            .max()
            .unwrap_or_default()
    }

    /// Confirmation is mandatory for medium/high total risk or any step
    /// flagged for approval. Never clears a flag that is already set.
    pub fn enforce_confirmation(&mut self) {
        if self.total_risk_level.requires_confirmation()
            || self.steps.iter().any(|s| s.requires_approval)
        {
            self.requires_confirmation = true;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

/// A plan waiting on the user's consent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub id: String,
    pub action: String,
    pub steps: Vec<String>,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_message: Option<String>,
    pub status: ApprovalStatus,
}

impl ApprovalRequest {
    pub fn for_plan(plan: &ActionPlan) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: plan.summary.clone(),
            steps: plan.steps.iter().map(PlanStep::display_line).collect(),
            risk_level: plan.total_risk_level,
            confirmation_message: plan.confirmation_message.clone(),
            status: ApprovalStatus::Pending,
        }
    }

    pub fn approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    pub fn denied(&self) -> bool {
        self.status == ApprovalStatus::Denied
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn resolve(&mut self, approved: bool) {
        self.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Denied
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_high_risk_forces_confirmation() {
        let steps = vec![PlanStep::new(1, "filesystem_list", json!({"path": "."}))];
        let plan = ActionPlan::new("list", steps, RiskLevel::High);
        assert!(plan.requires_confirmation);
    }

    #[test]
    fn test_step_approval_forces_confirmation() {
        let steps = vec![
            PlanStep::new(1, "filesystem_read", json!({})),
            PlanStep::new(2, "filesystem_write", json!({})).with_approval(true),
        ];
        let plan = ActionPlan::new("write", steps, RiskLevel::Low);
        assert!(plan.requires_confirmation);
    }

    #[test]
    fn test_low_risk_plan_needs_no_confirmation() {
        let steps = vec![PlanStep::new(1, "filesystem_read", json!({}))];
        let plan = ActionPlan::new("read", steps, RiskLevel::Low);
        assert!(!plan.requires_confirmation);
        assert_eq!(plan.max_step_risk(), RiskLevel::Low);
    }

    #[test]
    fn test_approval_status_is_exclusive() {
        let plan = ActionPlan::new(
            "delete logs",
            vec![PlanStep::new(1, "filesystem_delete", json!({})).with_description("Delete logs")],
            RiskLevel::High,
        );
        let mut approval = ApprovalRequest::for_plan(&plan);
        assert!(approval.is_pending());
        assert_eq!(approval.steps, vec!["1. Delete logs (filesystem_delete)".to_string()]);

        approval.resolve(false);
        assert!(approval.denied());
        assert!(!approval.approved());
        assert!(!approval.is_pending());
    }
}
