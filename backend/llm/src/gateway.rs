use std::sync::{Arc, PoisonError, RwLock};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use hearth_core::{GenerationBackend, GenerationRequest, HearthError, TextStream};

/// Which backends came up during `initialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub primary: bool,
    pub fallback: bool,
}

impl Availability {
    pub fn any(&self) -> bool {
        self.primary || self.fallback
    }
}

/// Sampling settings applied to every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// Single generate/stream/embed entry point over a primary backend and an
/// optional fallback.
///
/// A failed primary call is retried once against the fallback, never
/// against the primary. Embeddings are served by the primary only.
pub struct GenerationGateway {
    primary: Arc<dyn GenerationBackend>,
    fallback: Option<Arc<dyn GenerationBackend>>,
    availability: RwLock<Availability>,
    defaults: GenerationDefaults,
}

impl GenerationGateway {
    pub fn new(primary: Arc<dyn GenerationBackend>) -> Self {
        Self {
            primary,
            fallback: None,
            availability: RwLock::new(Availability::default()),
            defaults: GenerationDefaults::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn GenerationBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn availability(&self) -> Availability {
        *self
            .availability
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Check the primary, then the fallback. Each failure is logged on its
    /// own; only both failing is fatal.
    pub async fn initialize(&self) -> Result<Availability, HearthError> {
        let primary = match self.primary.initialize().await {
            Ok(()) => {
                info!(backend = %self.primary.name(), "Primary backend initialized");
                true
            }
            Err(e) => {
                warn!(backend = %self.primary.name(), error = %e, "Failed to initialize primary backend");
                false
            }
        };

        let fallback = match &self.fallback {
            Some(fb) => match fb.initialize().await {
                Ok(()) => {
                    info!(backend = %fb.name(), "Fallback backend initialized");
                    true
                }
                Err(e) => {
                    warn!(backend = %fb.name(), error = %e, "Failed to initialize fallback backend");
                    false
                }
            },
            None => false,
        };

        let availability = Availability { primary, fallback };
        *self
            .availability
            .write()
            .unwrap_or_else(PoisonError::into_inner) = availability;

        if !availability.any() {
            return Err(HearthError::NoBackendAvailable);
        }
        Ok(availability)
    }

    fn request(&self, prompt: &str, system: Option<&str>) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            system: system.map(str::to_string),
            temperature: self.defaults.temperature,
            max_tokens: self.defaults.max_tokens,
        }
    }

    fn usable_fallback(&self, availability: Availability) -> Option<&Arc<dyn GenerationBackend>> {
        self.fallback.as_ref().filter(|_| availability.fallback)
    }

    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, HearthError> {
        let request = self.request(prompt, system);
        let availability = self.availability();
        let mut last_error = None;

        if availability.primary {
            match self.primary.generate(&request).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(backend = %self.primary.name(), error = %e, "Primary generation failed, trying fallback");
                    last_error = Some(HearthError::backend(self.primary.name(), e));
                }
            }
        }

        if let Some(fallback) = self.usable_fallback(availability) {
            return fallback.generate(&request).await.map_err(|e| {
                warn!(backend = %fallback.name(), error = %e, "Fallback generation failed");
                HearthError::backend(fallback.name(), e)
            });
        }

        Err(last_error.unwrap_or(HearthError::NoBackendAvailable))
    }

    /// Stream tokens. Fallback only happens before the first chunk; once a
    /// backend has produced output its later errors are yielded in-stream.
    pub async fn stream(&self, prompt: &str, system: Option<&str>) -> Result<TextStream, HearthError> {
        let request = self.request(prompt, system);
        let availability = self.availability();
        let mut last_error = None;

        if availability.primary {
            match open_stream(self.primary.as_ref(), &request).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!(backend = %self.primary.name(), error = %e, "Primary streaming failed, trying fallback");
                    last_error = Some(HearthError::backend(self.primary.name(), e));
                }
            }
        }

        if let Some(fallback) = self.usable_fallback(availability) {
            return open_stream(fallback.as_ref(), &request).await.map_err(|e| {
                warn!(backend = %fallback.name(), error = %e, "Fallback streaming failed");
                HearthError::backend(fallback.name(), e)
            });
        }

        Err(last_error.unwrap_or(HearthError::NoBackendAvailable))
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, HearthError> {
        if !self.availability().primary {
            return Err(HearthError::EmbeddingsUnavailable);
        }
        self.primary
            .embed(text)
            .await
            .map_err(|e| HearthError::backend(self.primary.name(), e))
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, HearthError> {
        if !self.availability().primary {
            return Err(HearthError::EmbeddingsUnavailable);
        }
        self.primary
            .embed_batch(texts)
            .await
            .map_err(|e| HearthError::backend(self.primary.name(), e))
    }
}

/// Open a backend stream and wait for its first chunk so that early
/// failures can still fall back.
async fn open_stream(
    backend: &dyn GenerationBackend,
    request: &GenerationRequest,
) -> anyhow::Result<TextStream> {
    let mut inner = backend.stream(request).await?;
    match inner.next().await {
        Some(Ok(first)) => {
            debug!(backend = %backend.name(), "Stream produced first chunk");
            Ok(stream::once(async move { Ok(first) }).chain(inner).boxed())
        }
        Some(Err(e)) => Err(e),
        None => Ok(stream::empty().boxed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockBackend;

    async fn gateway(primary: MockBackend, fallback: Option<MockBackend>) -> (GenerationGateway, Arc<MockBackend>, Option<Arc<MockBackend>>) {
        let primary = Arc::new(primary);
        let mut gw = GenerationGateway::new(primary.clone());
        let fallback = fallback.map(Arc::new);
        if let Some(fb) = &fallback {
            gw = gw.with_fallback(fb.clone());
        }
        let _ = gw.initialize().await;
        (gw, primary, fallback)
    }

    #[tokio::test]
    async fn test_initialize_fails_only_when_both_unavailable() {
        let (gw, _, _) = gateway(
            MockBackend::new("local").unavailable(),
            Some(MockBackend::new("remote")),
        )
        .await;
        assert_eq!(gw.availability(), Availability { primary: false, fallback: true });

        let gw = GenerationGateway::new(Arc::new(MockBackend::new("local").unavailable()))
            .with_fallback(Arc::new(MockBackend::new("remote").unavailable()));
        assert!(matches!(gw.initialize().await, Err(HearthError::NoBackendAvailable)));
    }

    #[tokio::test]
    async fn test_generate_falls_back_without_primary_retry() {
        let (gw, primary, fallback) = gateway(
            MockBackend::new("local").failing(),
            Some(MockBackend::new("remote").with_response("from fallback")),
        )
        .await;

        let text = gw.generate("hello", None).await.unwrap();
        assert_eq!(text, "from fallback");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.unwrap().calls(), 1);
    }

    #[tokio::test]
    async fn test_both_failing_returns_fallback_error() {
        let (gw, _, _) = gateway(
            MockBackend::new("local").failing(),
            Some(MockBackend::new("remote").failing()),
        )
        .await;

        match gw.generate("hello", None).await {
            Err(HearthError::Backend { backend, .. }) => assert_eq!(backend, "remote"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_primary_error_without_fallback() {
        let (gw, _, _) = gateway(MockBackend::new("local").failing(), None).await;
        match gw.generate("hello", None).await {
            Err(HearthError::Backend { backend, .. }) => assert_eq!(backend, "local"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_stream_falls_back_before_first_chunk() {
        let (gw, _, _) = gateway(
            MockBackend::new("local").failing(),
            Some(MockBackend::new("remote").with_response("streamed text").with_chunk_chars(5)),
        )
        .await;

        let chunks: Vec<String> = gw
            .stream("hi", Some("system"))
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), "streamed text");
        assert_eq!(chunks[0], "strea");
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_delivery() {
        let (gw, _, _) = gateway(
            MockBackend::new("local").with_response("abcdefgh").with_chunk_chars(2),
            None,
        )
        .await;

        let mut stream = gw.stream("hi", None).await.unwrap();
        let mut received = String::new();
        if let Some(Ok(chunk)) = stream.next().await {
            received.push_str(&chunk);
        }
        drop(stream);
        assert_eq!(received, "ab");
    }

    #[tokio::test]
    async fn test_embeddings_require_primary() {
        let (gw, _, _) = gateway(
            MockBackend::new("local").unavailable(),
            Some(MockBackend::new("remote")),
        )
        .await;
        assert!(matches!(gw.embed("x").await, Err(HearthError::EmbeddingsUnavailable)));

        let (gw, _, _) = gateway(MockBackend::new("local").with_dimension(3), None).await;
        let vectors = gw.embed_batch(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 3);
    }
}
