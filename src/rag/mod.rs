// Ingestion, deletion and grounded question answering


pub mod retriever;

pub use retriever::Retriever;

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunking::{ChunkingConfig, chunk_text};
use crate::config::Config;
use crate::embeddings::{Embedder, EmbeddingClient};
use crate::generation::{self, GenerationParams, Generator, build_context, build_prompt};
use crate::store::{self, DeletionFilter, EmbeddedDocument, Metadata, VectorStore, document_id_for};
use crate::{RagError, Result};

const WARM_UP_QUERY: &str = "warmup query";

/// A passage submitted for ingestion
///
/// Its identity comes from `meta.title` and `meta.chunk`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawDocument {
    pub content: String,
    #[serde(default)]
    pub meta: Metadata,
}

impl RawDocument {
    #[inline]
    pub fn new(content: impl Into<String>, meta: Metadata) -> Self {
        Self {
            content: content.into(),
            meta,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub title: Option<String>,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

/// Per-query behaviour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub default_top_k: usize,
    pub include_sources: bool,
    pub generation: GenerationParams,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            include_sources: true,
            generation: GenerationParams::default(),
        }
    }
}

impl From<&Config> for QueryOptions {
    #[inline]
    fn from(config: &Config) -> Self {
        Self {
            default_top_k: config.query.default_top_k,
            include_sources: config.query.include_sources,
            generation: GenerationParams::from(&config.generation),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoreStatus {
    pub backend: &'static str,
    pub documents: u64,
}

/// Health check failures per provider; `None` means healthy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderHealth {
    pub embedding: Option<String>,
    pub generation: Option<String>,
}

/// Orchestrates embedding, storage, retrieval and generation
pub struct RagService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    options: QueryOptions,
    chunking: ChunkingConfig,
}

impl RagService {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        options: QueryOptions,
    ) -> Self {
        Self {
            embedder,
            retriever: Retriever::new(Arc::clone(&store)),
            store,
            generator,
            options,
            chunking: ChunkingConfig::default(),
        }
    }

    #[inline]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Build every collaborator from configuration
    #[inline]
    pub async fn initialize(config: &Config) -> Result<Self> {
        config.chunking.validate()?;

        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::from_config(&config.embedding)?);
        let generator = generation::from_config(&config.generation)?;
        let store = store::connect(config).await?;

        if store.dimension() != embedder.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimension(),
            });
        }

        info!(
            "RAG service ready: {} embeddings ({} dims), {} generation, {} store",
            config.embedding.backend.as_str(),
            embedder.dimension(),
            generator.name(),
            store.backend()
        );

        Ok(Self::new(embedder, store, generator, QueryOptions::from(config))
            .with_chunking(config.chunking.clone()))
    }

    #[inline]
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    #[inline]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Check the providers and run one query embedding
    #[inline]
    pub async fn warm_up(&self) -> Result<()> {
        debug!("Warming up embedding provider");
        self.embedder.health_check().await?;
        self.embedder.embed_one(WARM_UP_QUERY).await?;

        if let Err(e) = self.generator.health_check().await {
            warn!("Generator health check failed: {}", e);
        }

        info!("Warm-up complete");
        Ok(())
    }

    /// Embed and upsert documents, returning how many were written
    ///
    /// Blank documents are skipped. When several documents share an id only
    /// the last one is kept, at the position of the first.
    #[inline]
    pub async fn ingest(&self, documents: Vec<RawDocument>) -> Result<usize> {
        let received = documents.len();
        let mut prepared: Vec<(String, RawDocument)> = Vec::with_capacity(received);
        let mut positions: HashMap<String, usize> = HashMap::new();

        for document in documents {
            if document.content.trim().is_empty() {
                warn!(
                    "Skipping blank document {}",
                    serde_json::Value::Object(document.meta.clone())
                );
                continue;
            }

            let id = document_id_for(&document.meta);
            if let Some(&position) = positions.get(&id) {
                debug!("Duplicate document id {} in batch, keeping the last", id);
                prepared[position] = (id, document);
            } else {
                positions.insert(id.clone(), prepared.len());
                prepared.push((id, document));
            }
        }

        if prepared.is_empty() {
            info!("Nothing to ingest ({} documents received)", received);
            return Ok(0);
        }

        let texts: Vec<String> = prepared
            .iter()
            .map(|(_, document)| document.content.clone())
            .collect();
        let embeddings = self.embedder.embed(&texts).await?;

        if embeddings.len() != prepared.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                prepared.len(),
                embeddings.len()
            )));
        }

        let embedded: Vec<EmbeddedDocument> = prepared
            .into_iter()
            .zip(embeddings)
            .map(|((id, document), embedding)| EmbeddedDocument {
                id,
                content: document.content,
                embedding,
                metadata: document.meta,
            })
            .collect();

        self.store.upsert(&embedded).await?;

        info!(
            "Ingested {} documents ({} received)",
            embedded.len(),
            received
        );
        Ok(embedded.len())
    }

    /// Split a text into ingestion documents carrying `{title, chunk, source}`
    #[inline]
    pub fn chunk_documents(
        &self,
        title: &str,
        source: Option<&str>,
        text: &str,
    ) -> Result<Vec<RawDocument>> {
        let chunks = chunk_text(text, Some(title), &self.chunking)?;
        debug!("Split '{}' into {} chunks", title, chunks.len());

        Ok(chunks
            .into_iter()
            .map(|chunk| {
                let mut meta = Metadata::new();
                meta.insert("title".to_string(), json!(title));
                meta.insert("chunk".to_string(), json!(chunk.index));
                if let Some(source) = source {
                    meta.insert("source".to_string(), json!(source));
                }
                RawDocument::new(chunk.text, meta)
            })
            .collect())
    }

    /// Chunk a text and ingest every chunk
    #[inline]
    pub async fn ingest_text(&self, title: &str, source: Option<&str>, text: &str) -> Result<usize> {
        let documents = self.chunk_documents(title, source, text)?;
        self.ingest(documents).await
    }

    /// Remove every document whose metadata matches the filter
    #[inline]
    pub async fn delete(&self, filter: &DeletionFilter) -> Result<u64> {
        let deleted = self.store.delete_by_filter(filter).await?;
        info!("Deleted {} documents", deleted);
        Ok(deleted)
    }

    /// Answer a question from the stored passages
    ///
    /// A failed generation becomes the answer text instead of an error.
    #[inline]
    pub async fn query(&self, text: &str, top_k: Option<usize>) -> Result<QueryResult> {
        let top_k = top_k.unwrap_or(self.options.default_top_k);

        let vector = self.embedder.embed_one(text).await?;
        let hits = self.retriever.retrieve(&vector, top_k).await?;

        let context = build_context(&hits);
        let prompt = build_prompt(text, &context);

        let answer = match self
            .generator
            .generate(&prompt, &self.options.generation)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Generation failed: {}", e);
                format!("Generation failed: {}", e)
            }
        };

        let sources = self.options.include_sources.then(|| {
            hits.iter()
                .map(|hit| Source {
                    title: hit.document.title().map(str::to_string),
                    score: hit.score,
                })
                .collect()
        });

        info!("Answered query with {} passages", hits.len());
        Ok(QueryResult { answer, sources })
    }

    /// Probe both providers without failing fast
    #[inline]
    pub async fn provider_health(&self) -> ProviderHealth {
        ProviderHealth {
            embedding: self.embedder.health_check().await.err().map(|e| e.to_string()),
            generation: self.generator.health_check().await.err().map(|e| e.to_string()),
        }
    }

    #[inline]
    pub async fn status(&self) -> Result<StoreStatus> {
        Ok(StoreStatus {
            backend: self.store.backend(),
            documents: self.store.count().await?,
        })
    }
}
