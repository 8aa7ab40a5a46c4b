use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hearth_core::{GenerationBackend, GenerationRequest, TextStream};

use super::{line_stream, LineEvent};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Local Ollama backend, the primary in the default setup.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OllamaBackend {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest, stream: bool) -> GenerateBody<'a> {
        GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    async fn post_generate(&self, body: &GenerateBody<'_>) -> Result<reqwest::Response> {
        debug!(model = %self.model, stream = body.stream, "Sending request to Ollama");
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(body)
            .send()
            .await
            .context("Ollama HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {}: {}", status, error_body);
        }
        Ok(response)
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

fn parse_ndjson_line(line: &str) -> Result<LineEvent> {
    let chunk: GenerateChunk =
        serde_json::from_str(line).context("Failed to parse Ollama stream chunk")?;
    if let Some(error) = chunk.error {
        anyhow::bail!("Ollama stream error: {}", error);
    }
    if !chunk.response.is_empty() {
        Ok(LineEvent::Token(chunk.response))
    } else if chunk.done {
        Ok(LineEvent::Done)
    } else {
        Ok(LineEvent::Skip)
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn initialize(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("Cannot connect to Ollama at {}", self.base_url))?;
        if !response.status().is_success() {
            anyhow::bail!("Ollama health check returned {}", response.status());
        }
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let response = self.post_generate(&self.body(request, false)).await?;
        let chunk: GenerateChunk = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;
        if let Some(error) = chunk.error {
            anyhow::bail!("Ollama error: {}", error);
        }
        Ok(chunk.response)
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream> {
        let response = self.post_generate(&self.body(request, true)).await?;
        Ok(line_stream(Box::pin(response.bytes_stream()), parse_ndjson_line))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbeddingBody {
                model: &self.embedding_model,
                prompt: text,
            })
            .send()
            .await
            .context("Ollama embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {}: {}", status, error_body);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse Ollama embedding response")?;
        Ok(parsed.embedding)
    }
}
