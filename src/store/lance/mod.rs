
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    DeletionFilter, EmbeddedDocument, Metadata, ScoredDocument, VectorStore, ensure_dimensions,
    ensure_query_dimension,
};
use crate::{RagError, Result};

const TABLE_NAME: &str = "documents";

/// Ids per `IN (...)` delete predicate
const DELETE_BATCH: usize = 500;

/// Embedded vector store backed by a LanceDB table
pub struct LanceDbStore {
    connection: Connection,
    dimension: usize,
}

impl LanceDbStore {
    /// Open (or create) the database at `path`
    ///
    /// An existing table whose vector column has a different dimension is
    /// rejected rather than rebuilt.
    #[inline]
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        debug!("Opening LanceDB at path: {:?}", path);

        std::fs::create_dir_all(path).map_err(|e| {
            RagError::Store(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = path.display().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            dimension,
        };
        store.initialize_table().await?;

        info!("LanceDB store ready at {}", uri);
        Ok(store)
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to list tables: {}", e)))?;

        if table_names.iter().any(|name| name == TABLE_NAME) {
            let existing = self.existing_dimension().await?;
            if existing != self.dimension {
                return Err(RagError::Config(format!(
                    "LanceDB table '{}' stores {}-dimensional vectors but the embedding dimension is {}",
                    TABLE_NAME, existing, self.dimension
                )));
            }
            debug!("Documents table already exists with {} dimensions", existing);
            return Ok(());
        }

        self.connection
            .create_empty_table(TABLE_NAME, create_schema(self.dimension))
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to create table: {}", e)))?;

        info!("Created documents table with {} dimensions", self.dimension);
        Ok(())
    }

    async fn existing_dimension(&self) -> Result<usize> {
        let schema = self
            .table()
            .await?
            .schema()
            .await
            .map_err(|e| RagError::Store(format!("Failed to get table schema: {}", e)))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::Store("Could not find vector column or determine dimension".to_string())
            })
    }

    async fn table(&self) -> Result<Table> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to open table: {}", e)))
    }

    fn create_record_batch(&self, documents: &[EmbeddedDocument]) -> Result<RecordBatch> {
        let len = documents.len();
        let created_at = chrono::Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut titles = Vec::with_capacity(len);
        let mut chunks = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut metadata = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for document in documents {
            ids.push(document.id.as_str());
            contents.push(document.content.as_str());
            titles.push(document.metadata.get("title").and_then(Value::as_str));
            chunks.push(document.metadata.get("chunk").and_then(Value::as_i64));
            sources.push(document.metadata.get("source").and_then(Value::as_str));
            metadata.push(
                serde_json::to_string(&document.metadata).map_err(|e| {
                    RagError::Store(format!("Failed to serialize metadata: {}", e))
                })?,
            );
            flat_values.extend_from_slice(&document.embedding);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_width(self.dimension)?,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Store(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(titles)),
            Arc::new(Int64Array::from(chunks)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(StringArray::from(vec![created_at.as_str(); len])),
        ];

        RecordBatch::try_new(create_schema(self.dimension), arrays)
            .map_err(|e| RagError::Store(format!("Failed to create record batch: {}", e)))
    }
}

#[async_trait]
impl VectorStore for LanceDbStore {
    fn backend(&self) -> &'static str {
        "lancedb"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, documents: &[EmbeddedDocument]) -> Result<()> {
        if documents.is_empty() {
            debug!("No documents to upsert");
            return Ok(());
        }
        ensure_dimensions(documents, self.dimension)?;

        let record_batch = self.create_record_batch(documents)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let table = self.table().await?;
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RagError::Store(format!("Failed to upsert documents: {}", e)))?;

        debug!("Upserted {} documents into LanceDB", documents.len());
        Ok(())
    }

    async fn filter_ids(&self, filter: &DeletionFilter) -> Result<Vec<String>> {
        let table = self.table().await?;
        let predicate = pushdown_predicate(filter);

        let candidates = table
            .count_rows(predicate.clone())
            .await
            .map_err(|e| RagError::Store(format!("Failed to count rows: {}", e)))?;
        if candidates == 0 {
            return Ok(Vec::new());
        }

        let mut query = table
            .query()
            .select(Select::columns(&["id", "metadata"]))
            .limit(candidates);
        if let Some(predicate) = predicate {
            query = query.only_if(predicate);
        }

        let mut results = query
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to execute filter query: {}", e)))?;

        let mut ids = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read result stream: {}", e)))?
        {
            let id_column = string_column(&batch, "id")?;
            let metadata_column = string_column(&batch, "metadata")?;

            for row in 0..batch.num_rows() {
                let metadata = parse_metadata(metadata_column.value(row))?;
                if filter.matches(&metadata) {
                    ids.push(id_column.value(row).to_string());
                }
            }
        }

        debug!("Filter matched {} of {} candidate rows", ids.len(), candidates);
        Ok(ids)
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let table = self.table().await?;
        let mut deleted = 0;

        for batch in ids.chunks(DELETE_BATCH) {
            let list = batch
                .iter()
                .map(|id| quote(id))
                .collect::<Vec<_>>()
                .join(", ");
            let predicate = format!("id IN ({})", list);

            let existing = table
                .count_rows(Some(predicate.clone()))
                .await
                .map_err(|e| RagError::Store(format!("Failed to count rows: {}", e)))?;
            if existing == 0 {
                continue;
            }

            table
                .delete(&predicate)
                .await
                .map_err(|e| RagError::Store(format!("Failed to delete documents: {}", e)))?;
            deleted += existing as u64;
        }

        info!("Deleted {} documents from LanceDB", deleted);
        Ok(deleted)
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        ensure_query_dimension(vector, self.dimension)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let table = self.table().await?;
        let mut results = table
            .vector_search(vector)
            .map_err(|e| RagError::Store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch)?);
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        debug!("Vector search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        let count = self
            .table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RagError::Store(format!("Failed to count rows: {}", e)))?;
        Ok(count as u64)
    }
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    let width = i32::try_from(dimension).unwrap_or(i32::MAX);
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), width),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("chunk", DataType::Int64, true),
        Field::new("source", DataType::Utf8, true),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn vector_width(dimension: usize) -> Result<i32> {
    i32::try_from(dimension)
        .map_err(|_| RagError::Store(format!("Vector dimension {} is too large", dimension)))
}

/// SQL predicate over the indexed columns that narrows the candidates for
/// `filter`; the JSON metadata is still checked row by row
fn pushdown_predicate(filter: &DeletionFilter) -> Option<String> {
    let clauses: Vec<String> = filter
        .iter()
        .filter_map(|(key, value)| match (key.as_str(), value) {
            ("title" | "source", Value::String(text)) => Some(format!("{} = {}", key, quote(text))),
            ("chunk", Value::Number(number)) => number.as_i64().map(|n| format!("chunk = {}", n)),
            _ => None,
        })
        .collect();

    (!clauses.is_empty()).then(|| clauses.join(" AND "))
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn parse_metadata(raw: &str) -> Result<Metadata> {
    serde_json::from_str(raw)
        .map_err(|e| RagError::Store(format!("Invalid metadata JSON in LanceDB row: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Store(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredDocument>> {
    let ids = string_column(batch, "id")?;
    let contents = string_column(batch, "content")?;
    let metadata = string_column(batch, "metadata")?;

    let vectors = batch
        .column_by_name("vector")
        .ok_or_else(|| RagError::Store("Missing vector column".to_string()))?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| RagError::Store("Invalid vector column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let embedding = vectors
            .value(row)
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|values| values.values().to_vec())
            .ok_or_else(|| RagError::Store("Invalid vector values type".to_string()))?;

        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        hits.push(ScoredDocument {
            document: EmbeddedDocument {
                id: ids.value(row).to_string(),
                content: contents.value(row).to_string(),
                embedding,
                metadata: parse_metadata(metadata.value(row))?,
            },
            // cosine distance is 1 - similarity
            score: 1.0 - distance,
        });
    }

    Ok(hits)
}
