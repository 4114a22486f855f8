#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{HttpTransport, parse_url};
use crate::config::{EmbeddingSettings, GenerationSettings};
use crate::embeddings::{EmbeddingProvider, EmbeddingTask, ProviderError};
use crate::generation::{GenerationParams, Generator};
use crate::{RagError, Result};

/// Generic JSON-over-HTTP embedding or generation endpoint
///
/// The URL is the full endpoint; a configured API key is sent as a bearer
/// token.
#[derive(Debug, Clone)]
pub struct RemoteApiClient {
    transport: HttpTransport,
    url: Url,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

impl RemoteApiClient {
    #[inline]
    pub fn new(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(timeout).with_bearer_token(api_key),
            url: parse_url(url)?,
        })
    }

    #[inline]
    pub fn for_embeddings(settings: &EmbeddingSettings) -> Result<Self> {
        Self::new(
            &settings.url,
            settings.api_key.as_deref(),
            settings.timeout(),
        )
    }

    #[inline]
    pub fn for_generation(settings: &GenerationSettings) -> Result<Self> {
        Self::new(
            &settings.url,
            settings.api_key.as_deref(),
            settings.timeout(),
        )
    }

    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Pull the answer text out of a completion response
///
/// Accepts `{"text": ..}` or `{"choices": [{"text": ..}]}` and falls back to
/// the raw JSON.
#[inline]
pub fn extract_text(response: &Value) -> String {
    if let Some(text) = response.get("text").and_then(Value::as_str) {
        return text.to_string();
    }

    if let Some(first) = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    {
        return first
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }

    response.to_string()
}

#[async_trait]
impl EmbeddingProvider for RemoteApiClient {
    fn name(&self) -> &str {
        "remote"
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _task: EmbeddingTask,
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let response: EmbedResponse = self
            .transport
            .post_json(&self.url, &EmbedRequest { inputs: texts })
            .await?;
        Ok(response.embeddings)
    }
}

#[async_trait]
impl Generator for RemoteApiClient {
    fn name(&self) -> &str {
        "remote"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = GenerateRequest {
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        debug!("Requesting completion from {}", self.url);

        let response: Value = self
            .transport
            .post_json(&self.url, &request)
            .await
            .map_err(|e| RagError::Generation(format!("Remote API: {}", e)))?;

        Ok(extract_text(&response))
    }
}
