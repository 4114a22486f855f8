use std::sync::Arc;
use tracing::debug;

use crate::Result;
use crate::store::{ScoredDocument, VectorStore};

/// Nearest-neighbour lookup over the vector store
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    #[inline]
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Top `top_k` passages for a query vector, best first
    #[inline]
    pub async fn retrieve(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let hits = self.store.search(vector, top_k).await?;
        debug!("Retrieved {} passages (top_k = {})", hits.len(), top_k);
        Ok(hits)
    }
}
