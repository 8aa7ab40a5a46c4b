//! Structured logging for Hearth.
//!
//! Console output goes to stderr so stdout stays free for the transport.
//! Agent events are redacted before they reach any sink.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{AgentEvent, EventLogEntry, EventLogger};
pub use logger::{LoggerGuard, init_logger};
pub use redact::redact_sensitive_data;
