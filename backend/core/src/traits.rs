use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::intent::RiskLevel;

/// Lazily produced text chunks. Finite and not restartable; dropping it
/// cancels the underlying call.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Request to a generation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Trait for text-generation and embedding backends.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name (e.g., "ollama", "openai").
    fn name(&self) -> &str;

    /// Check the backend; an error means it is unavailable.
    async fn initialize(&self) -> Result<()>;

    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Outcome of a tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A capability the agent can invoke from a plan.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of the tool (e.g., "filesystem_read").
    fn name(&self) -> &str;

    /// Description for the planning prompt.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters(&self) -> Value;

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn requires_approval(&self) -> bool {
        false
    }

    /// Execute the tool. Policy rejections come back as a failed
    /// `ToolOutput`; `Err` is reserved for unexpected failures.
    async fn execute(&self, args: Value) -> Result<ToolOutput>;
}
