use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use hearth_core::{GenerationBackend, GenerationRequest, TextStream};

/// A scripted backend that replays queued responses.
///
/// Once the queue is empty every call returns the default response.
pub struct MockBackend {
    name: String,
    responses: Mutex<VecDeque<String>>,
    default_response: String,
    unavailable: bool,
    failing: bool,
    chunk_chars: usize,
    chunk_delay: Option<Duration>,
    stream_error_after: Option<usize>,
    dimension: usize,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(VecDeque::new()),
            default_response: "Mock response".to_string(),
            unavailable: false,
            failing: false,
            chunk_chars: 4,
            chunk_delay: None,
            stream_error_after: None,
            dimension: 8,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response.into());
        self
    }

    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// `initialize` fails.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Every generate/stream/embed call fails.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn with_chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    /// Sleep before each streamed chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Streams yield `chunks` chunks, then an error in place of the rest.
    pub fn with_stream_error_after(mut self, chunks: usize) -> Self {
        self.stream_error_after = Some(chunks);
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension.max(1);
        self
    }

    /// Number of generate/stream/embed calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received by generate/stream, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_response(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.prompt.clone());
        if self.failing {
            anyhow::bail!("{} backend failure", self.name);
        }
        let queued = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Ok(queued.unwrap_or_else(|| self.default_response.clone()))
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        if self.unavailable {
            anyhow::bail!("{} backend unreachable", self.name);
        }
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.next_response(request)
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream> {
        let text = self.next_response(request)?;
        let chars: Vec<char> = text.chars().collect();
        let mut chunks: Vec<Result<String>> = chars
            .chunks(self.chunk_chars)
            .map(|c| Ok(c.iter().collect()))
            .collect();
        if let Some(after) = self.stream_error_after {
            chunks.truncate(after);
            chunks.push(Err(anyhow::anyhow!("{} stream interrupted", self.name)));
        }
        let Some(delay) = self.chunk_delay else {
            return Ok(stream::iter(chunks).boxed());
        };
        Ok(stream::iter(chunks)
            .then(move |chunk| async move {
                tokio::time::sleep(delay).await;
                chunk
            })
            .boxed())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            anyhow::bail!("{} backend failure", self.name);
        }
        // Deterministic bag-of-bytes vector so equal texts embed equally.
        let mut vector = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += f32::from(byte);
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}
