use thiserror::Error;

/// Top-level error type for the Hearth runtime.
#[derive(Debug, Error)]
pub enum HearthError {
    #[error("no generation backend available")]
    NoBackendAvailable,

    #[error("generation backend error ({backend}): {message}")]
    Backend { backend: String, message: String },

    #[error("embeddings unavailable: primary backend is not initialized")]
    EmbeddingsUnavailable,

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("Critical step failed: {0}")]
    CriticalStepFailed(String),

    #[error("no pending approval: {0}")]
    ApprovalNotPending(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HearthError {
    pub fn backend(backend: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.to_string(),
        }
    }
}
