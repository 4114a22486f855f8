#[cfg(test)]
mod tests;

pub mod lance;
pub mod memory;
pub mod qdrant;

pub use lance::LanceDbStore;
pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, StoreBackend};
use crate::{RagError, Result};

/// Free-form document metadata; `title`, `chunk` and `source` are the
/// well-known keys
pub type Metadata = Map<String, Value>;

/// A chunk with its embedding, as written to a vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

impl EmbeddedDocument {
    #[inline]
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}

/// A stored document and its cosine similarity to the query vector
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: EmbeddedDocument,
    pub score: f32,
}

/// Content-addressed document id: hex SHA-256 of `"{title}_{chunk}"`
#[inline]
pub fn document_id(title: &str, chunk: &str) -> String {
    format!("{:x}", Sha256::digest(format!("{title}_{chunk}").as_bytes()))
}

/// Document id derived from the `title` and `chunk` metadata keys
///
/// Missing keys render as empty strings; numbers render in decimal.
#[inline]
pub fn document_id_for(metadata: &Metadata) -> String {
    document_id(
        &identity_part(metadata.get("title")),
        &identity_part(metadata.get("chunk")),
    )
}

fn identity_part(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Exact-match metadata filter; every entry must match
///
/// An empty filter matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeletionFilter(Metadata);

impl DeletionFilter {
    #[inline]
    pub fn new(conditions: Metadata) -> Self {
        Self(conditions)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[inline]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        !self.is_empty()
            && self
                .0
                .iter()
                .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

impl From<Metadata> for DeletionFilter {
    #[inline]
    fn from(conditions: Metadata) -> Self {
        Self(conditions)
    }
}

/// Vector store capability used by the pipeline
///
/// Writes are keyed by [`EmbeddedDocument::id`]: writing an existing id
/// replaces the stored document.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for logs and status output
    fn backend(&self) -> &'static str;

    /// Vector length every stored embedding must have
    fn dimension(&self) -> usize;

    async fn upsert(&self, documents: &[EmbeddedDocument]) -> Result<()>;

    /// Ids of all documents whose metadata matches `filter`
    async fn filter_ids(&self, filter: &DeletionFilter) -> Result<Vec<String>>;

    /// Delete documents by id, returning how many were removed
    async fn delete_ids(&self, ids: &[String]) -> Result<u64>;

    /// The `top_k` most similar documents, best first
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>>;

    async fn count(&self) -> Result<u64>;

    /// Delete every document matching `filter`
    ///
    /// An empty filter deletes nothing and does not reach the backend.
    async fn delete_by_filter(&self, filter: &DeletionFilter) -> Result<u64> {
        if filter.is_empty() {
            debug!("Ignoring delete with an empty filter");
            return Ok(0);
        }

        let ids = self.filter_ids(filter).await?;
        if ids.is_empty() {
            debug!("No documents matched delete filter");
            return Ok(0);
        }

        let deleted = self.delete_ids(&ids).await?;
        info!(
            "Deleted {} documents from {} store",
            deleted,
            self.backend()
        );
        Ok(deleted)
    }
}

/// Reject any embedding whose length differs from `expected`
#[inline]
pub fn ensure_dimensions(documents: &[EmbeddedDocument], expected: usize) -> Result<()> {
    match documents
        .iter()
        .find(|document| document.embedding.len() != expected)
    {
        Some(document) => Err(RagError::DimensionMismatch {
            expected,
            actual: document.embedding.len(),
        }),
        None => Ok(()),
    }
}

#[inline]
pub fn ensure_query_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(RagError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}

/// Open the configured vector store
#[inline]
pub async fn connect(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let dimension = config.embedding.dimension;

    let store: Arc<dyn VectorStore> = match config.store.backend {
        StoreBackend::Qdrant => Arc::new(QdrantStore::connect(&config.store, dimension).await?),
        StoreBackend::Lancedb => {
            Arc::new(LanceDbStore::open(&config.vector_database_path(), dimension).await?)
        }
        StoreBackend::Memory => Arc::new(InMemoryStore::new(dimension)),
    };

    info!("Using {} vector store", store.backend());
    Ok(store)
}
