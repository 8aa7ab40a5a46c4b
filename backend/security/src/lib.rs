//! Policy checks applied before any tool touches the host.
//!
//! Paths are resolved lexically and checked against system directories and
//! an optional allow-list; shell commands are screened for destructive
//! patterns and configured block/allow rules.

pub mod command_policy;
pub mod path_policy;

pub use command_policy::{CommandPolicy, sanitize_output};
pub use path_policy::{PathPolicy, expand_user, normalize, resolve};

use thiserror::Error;

/// Why a path or command was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Path cannot be empty")]
    EmptyPath,

    #[error("Access to system directory not allowed: {0}")]
    SystemDirectory(String),

    #[error("Path not in allowed directories: {0}")]
    OutsideAllowList(String),

    #[error("Refusing to delete protected path: {0}")]
    ProtectedPath(String),

    #[error("Command cannot be empty")]
    EmptyCommand,

    #[error("Dangerous command pattern blocked: {0}")]
    DangerousCommand(String),

    #[error("Command blocked by policy: {0}")]
    BlockedCommand(String),

    #[error("Command not in allowed list")]
    NotAllowed,

    #[error("Invalid policy pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}
