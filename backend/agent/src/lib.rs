//! Hearth decision pipeline.
//!
//! A user turn runs through a fixed set of stages (classification, optional
//! clarification, context gathering, planning, approval, execution,
//! learning, response) chosen by a total transition function over the
//! turn's state.

pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod sessions;
pub mod stage;
pub mod stages;
pub mod state;

pub use pipeline::{DecisionPipeline, TokenSink, TurnResult};
pub use sessions::{SessionStore, SharedState};
pub use stage::{CONFIDENCE_THRESHOLD, MAX_TRANSITIONS, Stage};
pub use state::AgentState;
