use std::fmt;

use serde::{Deserialize, Serialize};

use hearth_core::IntentCategory;

use crate::state::AgentState;

/// Intents below this confidence go to clarification.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Upper bound on transitions in a single turn.
pub const MAX_TRANSITIONS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentClassification,
    ClarificationCheck,
    ContextGathering,
    ActionPlanning,
    PermissionCheck,
    ActionExecution,
    Learning,
    ResponseGeneration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntentClassification => "intent_classification",
            Self::ClarificationCheck => "clarification_check",
            Self::ContextGathering => "context_gathering",
            Self::ActionPlanning => "action_planning",
            Self::PermissionCheck => "permission_check",
            Self::ActionExecution => "action_execution",
            Self::Learning => "learning",
            Self::ResponseGeneration => "response_generation",
        }
    }

    /// Where to go after this stage has run, judged on the state it left
    /// behind. `None` ends the turn.
    pub fn next(self, state: &AgentState) -> Option<Stage> {
        let next = match self {
            Self::IntentClassification => match &state.intent {
                None => Self::ClarificationCheck,
                Some(i) if i.category == IntentCategory::ClarificationNeeded => {
                    Self::ClarificationCheck
                }
                Some(i) if i.category.is_conversational() => Self::ResponseGeneration,
                Some(i) if i.confidence < CONFIDENCE_THRESHOLD => Self::ClarificationCheck,
                Some(_) => Self::ContextGathering,
            },
            Self::ClarificationCheck => match &state.intent {
                Some(i)
                    if i.category != IntentCategory::ClarificationNeeded
                        && i.confidence >= CONFIDENCE_THRESHOLD =>
                {
                    Self::ContextGathering
                }
                _ => Self::ResponseGeneration,
            },
            Self::ContextGathering => Self::ActionPlanning,
            Self::ActionPlanning => match &state.action_plan {
                None => Self::ResponseGeneration,
                Some(plan) if plan.is_empty() => Self::ResponseGeneration,
                Some(plan) if plan.requires_confirmation => Self::PermissionCheck,
                Some(_) => Self::ActionExecution,
            },
            Self::PermissionCheck => match &state.pending_approval {
                None => Self::ActionExecution,
                Some(approval) if approval.approved() => Self::ActionExecution,
                // denied, or still waiting on the user
                Some(_) => Self::ResponseGeneration,
            },
            Self::ActionExecution => {
                if state.error.is_some() {
                    Self::ResponseGeneration
                } else {
                    Self::Learning
                }
            }
            Self::Learning => Self::ResponseGeneration,
            Self::ResponseGeneration => return None,
        };
        Some(next)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
