pub mod error;
pub mod event;
pub mod intent;
pub mod learning;
pub mod message;
pub mod plan;
pub mod tools;
pub mod traits;

pub use error::HearthError;
pub use event::{Event, EventKind};
pub use intent::{IntentCategory, Intent, RiskLevel};
pub use learning::{Feedback, Pattern, Prediction, Suggestion, SuggestionSource};
pub use message::{Message, Role, ToolCall, ToolCallStatus};
pub use plan::{ActionPlan, ApprovalRequest, ApprovalStatus, PlanStep};
pub use tools::ToolRegistry;
pub use traits::{GenerationBackend, GenerationRequest, TextStream, Tool, ToolOutput};
