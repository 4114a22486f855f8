
use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, GetPointsBuilder, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    DeletionFilter, EmbeddedDocument, Metadata, ScoredDocument, VectorStore, ensure_dimensions,
    ensure_query_dimension,
};
use crate::config::StoreSettings;
use crate::{RagError, Result};

const SCROLL_PAGE: u32 = 256;

/// Vector store backed by a Qdrant collection over gRPC
///
/// Points are keyed by a UUIDv5 of the document id; the payload holds
/// `content`, `doc_id` and the metadata object under `meta`.
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect and create the collection when it does not exist yet
    #[inline]
    pub async fn connect(settings: &StoreSettings, dimension: usize) -> Result<Self> {
        let url = settings.qdrant_url();
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(&url)
            .timeout(settings.timeout())
            .api_key(settings.api_key.clone())
            .build()
            .map_err(map_err)?;

        let store = Self {
            client,
            collection: settings.collection.clone(),
            dimension,
        };
        store.ensure_collection().await?;

        info!(
            "Qdrant store ready: collection '{}' at {}",
            store.collection, url
        );
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(map_err)?;

        if exists {
            debug!("Qdrant collection '{}' already exists", self.collection);
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(map_err)?;

        info!(
            "Created Qdrant collection '{}' with {} dimensions",
            self.collection, self.dimension
        );
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, documents: &[EmbeddedDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        ensure_dimensions(documents, self.dimension)?;

        let points = documents
            .iter()
            .map(|document| {
                let payload = Payload::try_from(json!({
                    "content": document.content,
                    "doc_id": document.id,
                    "meta": document.metadata,
                }))
                .map_err(map_err)?;

                Ok(PointStruct::new(
                    point_id(&document.id),
                    document.embedding.clone(),
                    payload,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(map_err)?;

        debug!("Upserted {} points into Qdrant", documents.len());
        Ok(())
    }

    async fn filter_ids(&self, filter: &DeletionFilter) -> Result<Vec<String>> {
        let qdrant_filter = build_filter(filter)?;
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .filter(qdrant_filter.clone())
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(false);

            if let Some(offset) = offset.take() {
                builder = builder.offset(offset);
            }

            let page = self.client.scroll(builder).await.map_err(map_err)?;

            ids.extend(
                page.result
                    .iter()
                    .filter_map(|point| point.payload.get("doc_id").and_then(string_value)),
            );

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!("Filter matched {} Qdrant points", ids.len());
        Ok(ids)
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| point_id(id)).collect();

        let existing = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, point_ids.clone())
                    .with_payload(false)
                    .with_vectors(false),
            )
            .await
            .map_err(map_err)?
            .result
            .len();

        if existing == 0 {
            return Ok(0);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(map_err)?;

        Ok(existing as u64)
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        ensure_query_dimension(vector, self.dimension)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(map_err)?;

        let hits = response
            .result
            .into_iter()
            .map(|point| ScoredDocument {
                document: document_from_payload(&point.payload),
                score: point.score,
            })
            .collect::<Vec<_>>();

        debug!("Qdrant search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(map_err)?;

        Ok(response.result.map_or(0, |result| result.count))
    }
}

fn map_err(e: QdrantError) -> RagError {
    RagError::Store(format!("Qdrant request failed: {}", e))
}

/// Stable point id for a document id
#[inline]
pub fn point_id(document_id: &str) -> PointId {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, document_id.as_bytes())
        .to_string()
        .into()
}

/// Translate a metadata filter into `meta.<key>` match conditions
fn build_filter(filter: &DeletionFilter) -> Result<Filter> {
    let conditions = filter
        .iter()
        .map(|(key, value)| {
            let field = format!("meta.{}", key);
            match value {
                Value::String(text) => Ok(Condition::matches(field, text.clone())),
                Value::Bool(flag) => Ok(Condition::matches(field, *flag)),
                Value::Number(number) => number
                    .as_i64()
                    .map(|n| Condition::matches(field, n))
                    .ok_or_else(|| unsupported_filter_value(key, value)),
                _ => Err(unsupported_filter_value(key, value)),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Filter::must(conditions))
}

fn unsupported_filter_value(key: &str, value: &Value) -> RagError {
    RagError::Store(format!(
        "Qdrant filters support strings, integers and booleans; '{}' is {}",
        key, value
    ))
}

fn document_from_payload(payload: &HashMap<String, QdrantValue>) -> EmbeddedDocument {
    let metadata = match payload.get("meta").map(to_json) {
        Some(Value::Object(map)) => map,
        _ => Metadata::new(),
    };

    EmbeddedDocument {
        id: payload
            .get("doc_id")
            .and_then(string_value)
            .unwrap_or_default(),
        content: payload
            .get("content")
            .and_then(string_value)
            .unwrap_or_default(),
        embedding: Vec::new(),
        metadata,
    }
}

fn string_value(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Convert a payload value back into JSON
fn to_json(value: &QdrantValue) -> Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(flag)) => Value::Bool(*flag),
        Some(Kind::IntegerValue(n)) => Value::from(*n),
        Some(Kind::DoubleValue(x)) => Value::from(*x),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(list)) => Value::Array(list.values.iter().map(to_json).collect()),
        Some(Kind::StructValue(object)) => Value::Object(
            object
                .fields
                .iter()
                .map(|(key, value)| (key.clone(), to_json(value)))
                .collect::<Map<String, Value>>(),
        ),
    }
}
