#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::de::value::StrDeserializer;
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Ollama,
    Remote,
    Gemini,
}

impl EmbeddingBackend {
    pub const ALL: [Self; 3] = [Self::Ollama, Self::Remote, Self::Gemini];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Remote => "remote",
            Self::Gemini => "gemini",
        }
    }

    #[inline]
    pub fn default_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::Remote => "http://localhost:8080/embed",
            Self::Gemini => "https://generativelanguage.googleapis.com",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    #[default]
    Ollama,
    Remote,
}

impl GenerationBackend {
    pub const ALL: [Self; 2] = [Self::Ollama, Self::Remote];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Qdrant,
    Lancedb,
    Memory,
}

impl StoreBackend {
    pub const ALL: [Self; 3] = [Self::Qdrant, Self::Lancedb, Self::Memory];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qdrant => "qdrant",
            Self::Lancedb => "lancedb",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_secs: f64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            url: EmbeddingBackend::Ollama.default_url().to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 16,
            timeout_secs: 30,
            retries: 3,
            retry_backoff_secs: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub backend: GenerationBackend,
    pub url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::Ollama,
            url: "http://localhost:11434".to_string(),
            model: "deepseek-r1:8b".to_string(),
            api_key: None,
            max_tokens: 1024,
            temperature: 0.1,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub host: String,
    /// gRPC port of the Qdrant server
    pub port: u16,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// LanceDB directory, `<config dir>/vectors` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Qdrant,
            host: "localhost".to_string(),
            port: 6334,
            collection: "kb_collection".to_string(),
            api_key: None,
            timeout_secs: 30,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Check providers and embed a probe query before accepting requests
    pub warm_up: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            warm_up: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuerySettings {
    pub default_top_k: usize,
    pub include_sources: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            include_sources: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid host: {0:?} (cannot be empty)")]
    InvalidHost(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid collection name: {0:?} (cannot be empty)")]
    InvalidCollection(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid retry count: {0} (must be at least 1)")]
    InvalidRetries(u32),
    #[error("Invalid retry backoff: {0} (must be a non-negative number of seconds)")]
    InvalidRetryBackoff(f64),
    #[error("Invalid timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max tokens: {0} (must be at least 1)")]
    InvalidMaxTokens(u32),
    #[error("Invalid target chunk size: {0} (must be between 100 and 10000 characters)")]
    InvalidTargetChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than the target chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),
    #[error("Invalid default top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("The {0} embedding backend requires an API key")]
    MissingApiKey(&'static str),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnvValue { name: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load `config.toml` from `config_dir`, apply environment overrides and
    /// validate the result
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::load_file(config_dir)?;
        config
            .apply_env_overrides(|name| std::env::var(name).ok())
            .context("Invalid environment override")?;
        config
            .validate()
            .with_context(|| "Configuration validation failed")?;
        Ok(config)
    }

    /// Read `config.toml` without environment overrides, falling back to
    /// defaults when the file is missing
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Default configuration directory: `<platform config dir>/kb-rag`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join("kb-rag"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Directory of the embedded LanceDB database
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("vectors"))
    }

    /// Override file values from environment variables
    ///
    /// `lookup` resolves a variable name to its value; [`Config::load`] passes
    /// the process environment.
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvOverrides { lookup };

        let embedding = &mut self.embedding;
        assign(&mut embedding.backend, env.choice("EMBED_BACKEND")?);
        assign(&mut embedding.url, env.string("EMBED_URL"));
        assign(&mut embedding.model, env.string("EMBED_MODEL"));
        assign(&mut embedding.dimension, env.parse("EMBED_DIM")?);
        assign(&mut embedding.batch_size, env.parse("EMBED_BATCH_SIZE")?);
        assign(&mut embedding.timeout_secs, env.parse("EMBED_TIMEOUT")?);
        assign(&mut embedding.retries, env.parse("EMBED_RETRIES")?);
        assign(
            &mut embedding.retry_backoff_secs,
            env.parse("EMBED_RETRY_BACKOFF")?,
        );
        if let Some(key) = env.string("EMBED_API_KEY") {
            embedding.api_key = Some(key);
        } else if embedding.api_key.is_none() {
            embedding.api_key = env.string("GEMINI_API_KEY");
        }

        let generation = &mut self.generation;
        assign(&mut generation.backend, env.choice("GEN_BACKEND")?);
        assign(&mut generation.url, env.string("GEN_URL"));
        assign(&mut generation.model, env.string("GEN_MODEL"));
        assign(&mut generation.api_key, env.string("GEN_API_KEY").map(Some));
        assign(&mut generation.max_tokens, env.parse("GEN_MAX_TOKENS")?);
        assign(&mut generation.temperature, env.parse("GEN_TEMPERATURE")?);
        assign(&mut generation.timeout_secs, env.parse("GEN_TIMEOUT")?);

        let store = &mut self.store;
        assign(&mut store.backend, env.choice("STORE_BACKEND")?);
        assign(&mut store.host, env.string("QDRANT_HOST"));
        assign(&mut store.port, env.parse("QDRANT_PORT")?);
        assign(&mut store.collection, env.string("QDRANT_COLLECTION"));
        assign(&mut store.api_key, env.string("QDRANT_API_KEY").map(Some));

        assign(&mut self.chunking.target_size, env.parse("CHUNK_SIZE")?);
        assign(&mut self.chunking.overlap, env.parse("CHUNK_OVERLAP")?);

        assign(&mut self.server.bind, env.string("RAG_BIND"));
        assign(&mut self.query.default_top_k, env.parse("RAG_TOP_K")?);
        assign(&mut self.query.include_sources, env.flag("RAG_INCLUDE_SOURCES")?);

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.generation.validate()?;
        self.store.validate()?;
        self.validate_chunking_config()?;
        self.server.validate()?;
        self.query.validate()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=10_000).contains(&config.target_size) {
            return Err(ConfigError::InvalidTargetChunkSize(config.target_size));
        }

        if config.overlap >= config.target_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap,
                config.target_size,
            ));
        }

        Ok(())
    }
}

impl EmbeddingSettings {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url(&self.url)?;
        validate_model(&self.model)?;
        validate_timeout(self.timeout_secs)?;

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if self.retries == 0 {
            return Err(ConfigError::InvalidRetries(self.retries));
        }

        if !self.retry_backoff_secs.is_finite() || self.retry_backoff_secs < 0.0 {
            return Err(ConfigError::InvalidRetryBackoff(self.retry_backoff_secs));
        }

        if self.backend == EmbeddingBackend::Gemini
            && self.api_key.as_deref().is_none_or(|key| key.trim().is_empty())
        {
            return Err(ConfigError::MissingApiKey(self.backend.as_str()));
        }

        Ok(())
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[inline]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.retry_backoff_secs)
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    #[inline]
    pub fn set_dimension(&mut self, dimension: usize) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.dimension = dimension;
        Ok(())
    }
}

impl GenerationSettings {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url(&self.url)?;
        validate_model(&self.model)?;
        validate_timeout(self.timeout_secs)?;

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        Ok(())
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StoreSettings {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.trim().is_empty() {
            return Err(ConfigError::InvalidCollection(self.collection.clone()));
        }
        validate_timeout(self.timeout_secs)?;

        if self.backend == StoreBackend::Qdrant {
            if self.host.trim().is_empty() {
                return Err(ConfigError::InvalidHost(self.host.clone()));
            }
            if self.port == 0 {
                return Err(ConfigError::InvalidPort(self.port));
            }
            validate_http_url(&self.qdrant_url())?;
        }

        Ok(())
    }

    /// gRPC endpoint of the Qdrant server
    #[inline]
    pub fn qdrant_url(&self) -> String {
        if self.host.contains("://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServerSettings {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr().map(|_| ())
    }

    #[inline]
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind.clone()))
    }
}

impl QuerySettings {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.default_top_k) {
            return Err(ConfigError::InvalidTopK(self.default_top_k));
        }
        Ok(())
    }
}

fn validate_http_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(())
}

fn validate_model(model: &str) -> Result<(), ConfigError> {
    if model.trim().is_empty() {
        return Err(ConfigError::InvalidModel(model.to_string()));
    }
    Ok(())
}

fn validate_timeout(secs: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&secs) {
        return Err(ConfigError::InvalidTimeout(secs));
    }
    Ok(())
}

fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Typed access to environment variables; blank values count as unset
struct EnvOverrides<F> {
    lookup: F,
}

impl<F> EnvOverrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        self.string(name)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| invalid_env_value(name, &value))
            })
            .transpose()
    }

    fn flag(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        self.string(name)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(invalid_env_value(name, &value)),
            })
            .transpose()
    }

    fn choice<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        self.string(name)
            .map(|value| {
                let lowered = value.to_ascii_lowercase();
                let deserializer: StrDeserializer<'_, serde::de::value::Error> =
                    lowered.as_str().into_deserializer();
                T::deserialize(deserializer).map_err(|_| invalid_env_value(name, &value))
            })
            .transpose()
    }
}

fn invalid_env_value(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}
