pub mod executor;

pub use executor::{ExecutionReport, PlanExecutor};
