// HTTP adapters for the embedding and generation services

#[cfg(test)]
mod tests;

pub mod gemini;
pub mod ollama;
pub mod remote;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::embeddings::ProviderError;

/// Blocking `ureq` agent driven from async code through `spawn_blocking`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    headers: Vec<(String, String)>,
}

impl HttpTransport {
    #[inline]
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            agent,
            headers: Vec::new(),
        }
    }

    /// Add a header sent with every request
    #[inline]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[inline]
    pub fn with_bearer_token(self, token: Option<&str>) -> Self {
        match token.map(str::trim).filter(|token| !token.is_empty()) {
            Some(token) => self.with_header("Authorization", &format!("Bearer {}", token)),
            None => self,
        }
    }

    #[inline]
    pub async fn post_json<Req, Resp>(&self, url: &Url, body: &Req) -> Result<Resp, ProviderError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_string(body)
            .map_err(|e| ProviderError::Fatal(format!("Failed to serialize request: {}", e)))?;

        let agent = self.agent.clone();
        let headers = self.headers.clone();
        let target = url.to_string();

        debug!("POST {} ({} bytes)", target, payload.len());

        let text = self
            .run(url, move || {
                let mut request = agent
                    .post(&target)
                    .header("Content-Type", "application/json");
                for (name, value) in &headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                request
                    .send(&payload)
                    .and_then(|mut response| response.body_mut().read_to_string())
            })
            .await?;

        parse_body(url, &text)
    }

    #[inline]
    pub async fn get_json<Resp>(&self, url: &Url) -> Result<Resp, ProviderError>
    where
        Resp: DeserializeOwned,
    {
        let agent = self.agent.clone();
        let headers = self.headers.clone();
        let target = url.to_string();

        debug!("GET {}", target);

        let text = self
            .run(url, move || {
                let mut request = agent.get(&target);
                for (name, value) in &headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                request
                    .call()
                    .and_then(|mut response| response.body_mut().read_to_string())
            })
            .await?;

        parse_body(url, &text)
    }

    async fn run<F>(&self, url: &Url, call: F) -> Result<String, ProviderError>
    where
        F: FnOnce() -> Result<String, ureq::Error> + Send + 'static,
    {
        tokio::task::spawn_blocking(call)
            .await
            .map_err(|e| ProviderError::Fatal(format!("HTTP worker task failed: {}", e)))?
            .map_err(|e| classify_ureq_error(url.as_str(), e))
    }
}

fn parse_body<Resp: DeserializeOwned>(url: &Url, text: &str) -> Result<Resp, ProviderError> {
    serde_json::from_str(text)
        .map_err(|e| ProviderError::Fatal(format!("Failed to parse response from {}: {}", url, e)))
}

/// Sort a transport failure into retryable and terminal
///
/// Server errors, rate limiting and transport failures are transient; other
/// status codes and protocol errors are not.
#[inline]
pub fn classify_ureq_error(url: &str, error: ureq::Error) -> ProviderError {
    match error {
        ureq::Error::StatusCode(status) if status >= 500 || status == 429 => {
            warn!("Server error (status {}) from {}", status, url);
            ProviderError::Transient(format!("HTTP {} from {}", status, url))
        }
        ureq::Error::StatusCode(status) => {
            warn!("Client error (status {}) from {}, not retrying", status, url);
            ProviderError::Fatal(format!("HTTP {} from {}", status, url))
        }
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => {
            warn!("Transport error calling {}: {}", url, error);
            ProviderError::Transient(format!("Transport error calling {}: {}", url, error))
        }
        other => ProviderError::Fatal(format!("Request to {} failed: {}", url, other)),
    }
}

/// Parse a configured service URL
#[inline]
pub fn parse_url(raw: &str) -> crate::Result<Url> {
    Url::parse(raw).map_err(|e| crate::RagError::Config(format!("Invalid URL '{}': {}", raw, e)))
}
