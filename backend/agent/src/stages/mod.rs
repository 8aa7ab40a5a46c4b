//! Stage implementations. Each stage reads and writes the turn's
//! [`AgentState`]; routing between them lives in [`crate::stage`].

pub mod clarification;
pub mod context;
pub mod execution;
pub mod intent;
pub mod learning;
pub mod permission;
pub mod planning;
pub mod response;

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use hearth_core::{Event, EventKind};
use hearth_executor::PlanExecutor;
use hearth_learning::Learner;
use hearth_llm::GenerationGateway;
use hearth_storage::{ActionLog, PreferenceStore, VectorStore};

use crate::pipeline::TokenSink;
use crate::stage::Stage;
use crate::state::AgentState;

/// Collaborators shared by every stage of every turn.
pub struct Services {
    pub gateway: Arc<GenerationGateway>,
    pub executor: PlanExecutor,
    pub learner: Option<Arc<Learner>>,
    pub action_log: Option<Arc<dyn ActionLog>>,
    pub preferences: Option<Arc<dyn PreferenceStore>>,
    pub vectors: Option<Arc<dyn VectorStore>>,
    pub assistant_name: String,
}

impl Services {
    /// Append to the action log, if one is attached. Failures are logged
    /// and swallowed; a turn never fails because auditing did.
    pub async fn record(&self, session_id: &str, kind: EventKind, payload: Value) {
        let Some(log) = &self.action_log else {
            return;
        };
        if let Err(e) = log.append(Event::new(session_id, kind, payload)).await {
            warn!(error = %e, %kind, "Failed to append to action log");
        }
    }
}

pub(crate) async fn run(
    stage: Stage,
    services: &Services,
    state: &mut AgentState,
    sink: Option<&TokenSink>,
) {
    match stage {
        Stage::IntentClassification => intent::run(services, state).await,
        Stage::ClarificationCheck => clarification::run(state),
        Stage::ContextGathering => context::run(services, state).await,
        Stage::ActionPlanning => planning::run(services, state).await,
        Stage::PermissionCheck => permission::run(services, state).await,
        Stage::ActionExecution => execution::run(services, state).await,
        Stage::Learning => learning::run(services, state).await,
        Stage::ResponseGeneration => response::run(services, state, sink).await,
    }
}
