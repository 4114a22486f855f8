
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    DeletionFilter, EmbeddedDocument, ScoredDocument, VectorStore, ensure_dimensions,
    ensure_query_dimension,
};
use crate::Result;

/// Process-local store with brute-force cosine search, for development and
/// tests
pub struct InMemoryStore {
    dimension: usize,
    documents: RwLock<HashMap<String, EmbeddedDocument>>,
}

impl InMemoryStore {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of a stored document
    #[inline]
    pub async fn get(&self, id: &str) -> Option<EmbeddedDocument> {
        self.documents.read().await.get(id).cloned()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, documents: &[EmbeddedDocument]) -> Result<()> {
        ensure_dimensions(documents, self.dimension)?;

        let mut stored = self.documents.write().await;
        for document in documents {
            stored.insert(document.id.clone(), document.clone());
        }
        debug!("Upserted {} documents in memory", documents.len());
        Ok(())
    }

    async fn filter_ids(&self, filter: &DeletionFilter) -> Result<Vec<String>> {
        let stored = self.documents.read().await;
        Ok(stored
            .values()
            .filter(|document| filter.matches(&document.metadata))
            .map(|document| document.id.clone())
            .collect())
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<u64> {
        let mut stored = self.documents.write().await;
        let removed = ids.iter().filter(|id| stored.remove(*id).is_some()).count();
        Ok(removed as u64)
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        ensure_query_dimension(vector, self.dimension)?;

        let stored = self.documents.read().await;
        let mut scored: Vec<ScoredDocument> = stored
            .values()
            .map(|document| ScoredDocument {
                score: cosine_similarity(vector, &document.embedding),
                document: document.clone(),
            })
            .collect();
        drop(stored);

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.documents.read().await.len() as u64)
    }
}

/// Cosine similarity in [-1, 1]; 0 when either vector has zero length
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
