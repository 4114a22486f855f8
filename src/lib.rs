use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] config::ConfigError),

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding failed after {attempts} attempt(s): {last_error}")]
    EmbeddingFailed { attempts: u32, last_error: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod generation;
pub mod providers;
pub mod rag;
pub mod server;
pub mod store;
