
pub mod prompt;

use async_trait::async_trait;
use std::sync::Arc;

use crate::Result;
use crate::config::{GenerationBackend, GenerationSettings};
use crate::providers::ollama::OllamaClient;
use crate::providers::remote::RemoteApiClient;

pub use prompt::{NO_RELEVANT_INFORMATION, build_context, build_prompt};

/// Sampling parameters for one generation call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.1,
        }
    }
}

impl From<&GenerationSettings> for GenerationParams {
    #[inline]
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

/// Produces an answer from a fully assembled prompt
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the generator for the configured backend
#[inline]
pub fn from_config(settings: &GenerationSettings) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match settings.backend {
        GenerationBackend::Ollama => Arc::new(OllamaClient::for_generation(settings)?),
        GenerationBackend::Remote => Arc::new(RemoteApiClient::for_generation(settings)?),
    };
    Ok(generator)
}
