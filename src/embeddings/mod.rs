// Embeddings: batching, retry and validation over a pluggable provider


use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{EmbeddingBackend, EmbeddingSettings};
use crate::providers::gemini::GeminiEmbedder;
use crate::providers::ollama::OllamaClient;
use crate::providers::remote::RemoteApiClient;
use crate::{RagError, Result};

const DEFAULT_BATCH_SIZE: usize = 16;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(800);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// What an embedding is for; providers with asymmetric models embed
/// queries and documents differently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    Document,
    Query,
}

/// Failure of a single provider call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Worth retrying: timeouts, connection failures, HTTP 5xx and 429
    #[error("{0}")]
    Transient(String),
    /// Retrying cannot help: other HTTP errors, malformed responses
    #[error("{0}")]
    Fatal(String),
}

impl ProviderError {
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// One raw embedding call per batch; retries and validation live in
/// [`EmbeddingClient`]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed_batch(
        &self,
        texts: &[String],
        task: EmbeddingTask,
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderError>;

    async fn health_check(&self) -> std::result::Result<(), ProviderError> {
        Ok(())
    }
}

/// Text-to-vector capability consumed by the RAG service
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// Embed document texts, one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Batched, retrying embedding client
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    batch_size: usize,
    retries: u32,
    retry_backoff: Duration,
    timeout: Duration,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimension: usize) -> Self {
        Self {
            provider,
            dimension,
            batch_size: DEFAULT_BATCH_SIZE,
            retries: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[inline]
    pub fn from_settings(provider: Arc<dyn EmbeddingProvider>, settings: &EmbeddingSettings) -> Self {
        Self::new(provider, settings.dimension)
            .with_batch_size(settings.batch_size)
            .with_retries(settings.retries)
            .with_retry_backoff(settings.retry_backoff())
            .with_timeout(settings.timeout())
    }

    /// Build the client for the configured backend
    #[inline]
    pub fn from_config(settings: &EmbeddingSettings) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> = match settings.backend {
            EmbeddingBackend::Ollama => Arc::new(OllamaClient::for_embeddings(settings)?),
            EmbeddingBackend::Remote => Arc::new(RemoteApiClient::for_embeddings(settings)?),
            EmbeddingBackend::Gemini => Arc::new(GeminiEmbedder::new(settings)?),
        };
        Ok(Self::from_settings(provider, settings))
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    #[inline]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Delay after the given failed attempt (1-based)
    #[inline]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_backoff * attempt
    }

    async fn embed_with_task(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_count = texts.len().div_ceil(self.batch_size);
        let mut embeddings = Vec::with_capacity(texts.len());

        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(
                "Embedding batch {}/{} ({} texts) via {}",
                index + 1,
                batch_count,
                batch.len(),
                self.provider.name()
            );
            let vectors = self.embed_batch_with_retry(batch, task).await?;
            embeddings.extend(vectors);
        }

        debug!("Generated {} embeddings total", embeddings.len());
        Ok(embeddings)
    }

    async fn embed_batch_with_retry(
        &self,
        batch: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>> {
        let mut last_error = String::new();

        for attempt in 1..=self.retries {
            let outcome =
                match tokio::time::timeout(self.timeout, self.provider.embed_batch(batch, task))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ProviderError::Transient(format!(
                        "embedding request timed out after {:?}",
                        self.timeout
                    ))),
                };

            match outcome {
                Ok(vectors) => {
                    if attempt > 1 {
                        debug!("Embedding batch succeeded on attempt {}", attempt);
                    }
                    self.check_alignment(batch.len(), &vectors)?;
                    return Ok(vectors);
                }
                Err(ProviderError::Fatal(message)) => {
                    error!("Embedding request failed, not retrying: {}", message);
                    return Err(RagError::EmbeddingFailed {
                        attempts: attempt,
                        last_error: message,
                    });
                }
                Err(ProviderError::Transient(message)) => {
                    warn!(
                        "Embedding attempt {}/{} failed: {}",
                        attempt, self.retries, message
                    );
                    last_error = message;

                    if attempt < self.retries {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        error!(
            "Embedding failed after {} attempts: {}",
            self.retries, last_error
        );
        Err(RagError::EmbeddingFailed {
            attempts: self.retries,
            last_error,
        })
    }

    fn check_alignment(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                expected,
                vectors.len()
            )));
        }

        if let Some(vector) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_with_task(texts, EmbeddingTask::Document).await
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(&[text.to_string()], EmbeddingTask::Query)
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("Provider returned no embedding".to_string()))
    }

    async fn health_check(&self) -> Result<()> {
        self.provider
            .health_check()
            .await
            .map_err(|e| RagError::Embedding(format!("{} health check failed: {}", self.provider.name(), e)))
    }
}
