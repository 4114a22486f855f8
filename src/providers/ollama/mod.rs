
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{HttpTransport, parse_url};
use crate::config::{EmbeddingSettings, GenerationSettings};
use crate::embeddings::{EmbeddingProvider, EmbeddingTask, ProviderError};
use crate::generation::{GenerationParams, Generator};
use crate::{RagError, Result};

/// Client for a local Ollama server, usable for embeddings and generation
#[derive(Debug, Clone)]
pub struct OllamaClient {
    transport: HttpTransport,
    base_url: Url,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(timeout),
            base_url: parse_url(base_url)?,
            model: model.to_string(),
        })
    }

    #[inline]
    pub fn for_embeddings(settings: &EmbeddingSettings) -> Result<Self> {
        Self::new(&settings.url, &settings.model, settings.timeout())
    }

    #[inline]
    pub fn for_generation(settings: &GenerationSettings) -> Result<Self> {
        Self::new(&settings.url, &settings.model, settings.timeout())
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Fatal(format!("Failed to build Ollama URL: {}", e)))
    }

    /// List all models pulled on the server
    #[inline]
    pub async fn list_models(&self) -> std::result::Result<Vec<ModelInfo>, ProviderError> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let response: ModelsResponse = self.transport.get_json(&url).await?;

        debug!("Found {} models", response.models.len());
        Ok(response.models)
    }

    /// Check that the server answers and the configured model is pulled
    #[inline]
    pub async fn validate_model(&self) -> std::result::Result<(), ProviderError> {
        let models = self.list_models().await?;
        let tagged = format!("{}:latest", self.model);

        if models
            .iter()
            .any(|m| m.name == self.model || m.name == tagged)
        {
            info!(
                "Health check passed for Ollama server at {} with model {}",
                self.base_url, self.model
            );
            return Ok(());
        }

        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        warn!(
            "Model {} not found. Available models: {:?}",
            self.model, available
        );
        Err(ProviderError::Fatal(format!(
            "Model '{}' is not available. Available models: {:?}",
            self.model, available
        )))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _task: EmbeddingTask,
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let url = self.endpoint("/api/embed")?;
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response: EmbedResponse = self.transport.post_json(&url, &request).await?;
        Ok(response.embeddings)
    }

    async fn health_check(&self) -> std::result::Result<(), ProviderError> {
        self.validate_model().await
    }
}

#[async_trait]
impl Generator for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = self.endpoint("/api/generate").map_err(generation_error)?;
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        debug!(
            "Generating with {} (prompt length: {})",
            self.model,
            prompt.len()
        );

        let response: GenerateResponse = self
            .transport
            .post_json(&url, &request)
            .await
            .map_err(generation_error)?;

        Ok(response.response)
    }

    async fn health_check(&self) -> Result<()> {
        self.validate_model().await.map_err(generation_error)
    }
}

fn generation_error(e: ProviderError) -> RagError {
    RagError::Generation(format!("Ollama: {}", e))
}
