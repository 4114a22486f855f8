
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{HttpTransport, parse_url};
use crate::config::EmbeddingSettings;
use crate::embeddings::{EmbeddingProvider, EmbeddingTask, ProviderError};
use crate::{RagError, Result};

/// Google Gemini `batchEmbedContents` client
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    transport: HttpTransport,
    base_url: Url,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    #[inline]
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| RagError::Config("Gemini embeddings require an API key".to_string()))?;

        Ok(Self {
            transport: HttpTransport::new(settings.timeout()).with_header("x-goog-api-key", api_key),
            base_url: parse_url(&settings.url)?,
            model: settings.model.clone(),
            dimension: settings.dimension,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> std::result::Result<Url, ProviderError> {
        self.base_url
            .join(&format!("/v1beta/models/{}:batchEmbedContents", self.model))
            .map_err(|e| ProviderError::Fatal(format!("Failed to build Gemini URL: {}", e)))
    }
}

/// Gemini task type for the embedding purpose
#[inline]
pub fn task_type(task: EmbeddingTask) -> &'static str {
    match task {
        EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
        EmbeddingTask::Query => "RETRIEVAL_QUERY",
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        task: EmbeddingTask,
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let url = self.endpoint()?;
        let model = format!("models/{}", self.model);

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &model,
                    content: Content {
                        parts: [Part { text }],
                    },
                    task_type: task_type(task),
                    output_dimensionality: self.dimension,
                })
                .collect(),
        };

        debug!(
            "Requesting {} Gemini embeddings ({})",
            texts.len(),
            task_type(task)
        );

        let response: BatchEmbedResponse = self.transport.post_json(&url, &request).await?;
        Ok(response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}
