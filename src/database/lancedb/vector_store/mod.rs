
use super::{
    DocumentMetadata, DocumentSource, IndexedDocument, normalize_collection_name,
    sanitize_collection_name,
};
use crate::{RagError, Result};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A named, disk-backed collection of embedded documents.
///
/// No ANN index is ever created on the table, so every search is an exact
/// flat scan by L2 distance.
pub struct VectorIndex {
    connection: Connection,
    collection: String,
    table_name: String,
    path: PathBuf,
    dimension: usize,
}

/// A document returned by a vector search, with its stored vector
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub document: IndexedDocument,
    pub vector: Vec<f32>,
    pub distance: f32,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("collection", &self.collection)
            .field("table_name", &self.table_name)
            .field("path", &self.path)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Open the collection's table under `persist_dir`, creating it when absent
    ///
    /// # Arguments
    /// * `persist_dir` - Directory holding all persisted collections
    /// * `collection` - Collection name, encoded into the table name
    /// * `dimension` - Vector dimension of the active embedding model
    ///
    /// # Errors
    /// * `RagError::Config` if an existing table stores vectors of another dimension
    /// * `RagError::Database` for storage failures
    #[inline]
    pub async fn open_or_create(
        persist_dir: &Path,
        collection: &str,
        dimension: usize,
    ) -> Result<Self> {
        std::fs::create_dir_all(persist_dir).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let (index, exists) = Self::connect(persist_dir, collection, dimension).await?;
        if exists {
            index.check_dimension().await?;
            info!(
                "Loaded existing collection '{}' ({} dimensions)",
                index.collection, dimension
            );
        } else {
            index
                .connection
                .create_empty_table(&index.table_name, create_schema(dimension)?)
                .execute()
                .await
                .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;
            info!(
                "Created collection '{}' with {} dimensions",
                index.collection, dimension
            );
        }

        Ok(index)
    }

    /// Open an existing collection without creating anything on disk
    ///
    /// # Errors
    /// * `RagError::NotInitialized` if the collection was never created
    /// * `RagError::Config` if the table stores vectors of another dimension
    #[inline]
    pub async fn open(persist_dir: &Path, collection: &str, dimension: usize) -> Result<Self> {
        let missing = || {
            RagError::NotInitialized(format!(
                "No collection named '{}' in {}",
                normalize_collection_name(collection),
                persist_dir.display()
            ))
        };

        if !Self::exists(persist_dir, collection) {
            return Err(missing());
        }

        let (index, exists) = Self::connect(persist_dir, collection, dimension).await?;
        if !exists {
            return Err(missing());
        }
        index.check_dimension().await?;
        info!(
            "Opened collection '{}' ({} dimensions)",
            index.collection, dimension
        );
        Ok(index)
    }

    /// Whether a table for `collection` is present under `persist_dir`
    #[inline]
    pub fn exists(persist_dir: &Path, collection: &str) -> bool {
        Self::table_path(persist_dir, collection).is_dir()
    }

    async fn connect(persist_dir: &Path, collection: &str, dimension: usize) -> Result<(Self, bool)> {
        if dimension == 0 {
            return Err(RagError::Config(
                "Vector dimension must be greater than zero".to_string(),
            ));
        }

        let table_name = sanitize_collection_name(collection);
        let path = Self::table_path(persist_dir, collection);
        debug!("Opening table '{}' at {:?}", table_name, path);

        let uri = persist_dir.to_string_lossy();
        let connection = lancedb::connect(uri.as_ref())
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;
        let exists = table_names.contains(&table_name);

        Ok((
            Self {
                connection,
                collection: normalize_collection_name(collection).to_string(),
                table_name,
                path,
                dimension,
            },
            exists,
        ))
    }

    async fn check_dimension(&self) -> Result<()> {
        let stored = self.detect_existing_vector_dimension().await?;
        if stored == self.dimension {
            Ok(())
        } else {
            Err(RagError::Config(format!(
                "Collection '{}' stores {}-dimensional vectors but the embedding model produces {} dimensions",
                self.collection, stored, self.dimension
            )))
        }
    }

    /// Deterministic on-disk location of a collection
    #[inline]
    pub fn table_path(persist_dir: &Path, collection: &str) -> PathBuf {
        persist_dir.join(format!("{}.lance", sanitize_collection_name(collection)))
    }

    /// Collection name as given by the user
    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn source_path(&self) -> PathBuf {
        self.path.with_extension("source.json")
    }

    /// Document this collection was built from, if one was recorded
    #[inline]
    pub fn source(&self) -> Result<Option<DocumentSource>> {
        let path = self.source_path();
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map(Some).map_err(|e| {
            RagError::Database(format!(
                "Unreadable source record {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Remember the document this collection was built from
    #[inline]
    pub fn record_source(&self, source: &DocumentSource) -> Result<()> {
        let content = serde_json::to_string_pretty(source)
            .map_err(|e| RagError::Database(format!("Failed to encode source record: {}", e)))?;
        std::fs::write(self.source_path(), content)?;
        debug!(
            "Recorded {} as the source of '{}'",
            source.document.display(),
            self.collection
        );
        Ok(())
    }

    async fn table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let schema = self
            .table()
            .await?
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size).map_err(|_| {
                        RagError::Database(format!("Invalid vector dimension: {}", size))
                    });
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Store documents with their embedding vectors
    ///
    /// # Returns
    /// * `Result<usize>` - Number of rows inserted
    #[inline]
    pub async fn insert(&self, documents: &[IndexedDocument], vectors: &[Vec<f32>]) -> Result<usize> {
        if documents.len() != vectors.len() {
            return Err(RagError::InvalidIndex(format!(
                "Got {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }
        if documents.is_empty() {
            debug!("No documents to store");
            return Ok(0);
        }
        if let Some(vector) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::InvalidIndex(format!(
                "Vector of dimension {} cannot be stored in a {}-dimensional index",
                vector.len(),
                self.dimension
            )));
        }

        let record_batch = self.create_record_batch(documents, vectors)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.table()
            .await?
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert documents: {}", e)))?;

        info!(
            "Stored {} documents in collection '{}'",
            documents.len(),
            self.collection
        );
        Ok(documents.len())
    }

    fn create_record_batch(
        &self,
        documents: &[IndexedDocument],
        vectors: &[Vec<f32>],
    ) -> Result<RecordBatch> {
        let len = documents.len();
        let created_at = chrono::Utc::now().to_rfc3339();

        let ids: Vec<String> = (0..len).map(|_| uuid::Uuid::new_v4().to_string()).collect();
        let chunk_ids: Vec<&str> = documents
            .iter()
            .map(|d| d.metadata.chunk_id.as_str())
            .collect();
        let page_nos: Vec<&str> = documents
            .iter()
            .map(|d| d.metadata.page_no.as_str())
            .collect();
        let contents: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let created_ats = vec![created_at.as_str(); len];

        let flat_values: Vec<f32> = vectors.iter().flatten().copied().collect();
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_width(self.dimension)?,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(chunk_ids)),
            Arc::new(StringArray::from(page_nos)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(create_schema(self.dimension)?, arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Exact nearest neighbours of `query_vector` by L2 distance, closest first
    ///
    /// # Errors
    /// * `RagError::InvalidIndex` if the query dimension differs from the index
    #[inline]
    pub async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchCandidate>> {
        if query_vector.len() != self.dimension {
            return Err(RagError::InvalidIndex(format!(
                "Query vector has dimension {} but the index stores {} dimensions",
                query_vector.len(),
                self.dimension
            )));
        }
        if limit == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let results = self
            .table()
            .await?
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::L2)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut candidates = parse_search_results_stream(results).await?;
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(candidates)
    }

    /// Total number of stored documents
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Highest numeric chunk id stored in the collection
    #[inline]
    pub async fn max_chunk_id(&self) -> Result<Option<u64>> {
        let count = self.count().await?;
        if count == 0 {
            return Ok(None);
        }

        let mut stream = self
            .table()
            .await?
            .query()
            .select(Select::columns(&["chunk_id"]))
            .limit(count)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to scan chunk ids: {}", e)))?;

        let mut max_id = None;
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            let chunk_ids = string_column(&batch, "chunk_id")?;
            for row in 0..batch.num_rows() {
                if let Ok(id) = chunk_ids.value(row).parse::<u64>() {
                    max_id = max_id.max(Some(id));
                }
            }
        }

        Ok(max_id)
    }
}

/// Create schema with the specified vector dimension
fn create_schema(dimension: usize) -> Result<Arc<Schema>> {
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_width(dimension)?,
            ),
            false,
        ),
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("page_no", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

fn vector_width(dimension: usize) -> Result<i32> {
    i32::try_from(dimension)
        .map_err(|_| RagError::Database(format!("Vector dimension {} is too large", dimension)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

/// Parse search results from LanceDB stream into candidates
async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<SearchCandidate>> {
    let mut candidates = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
    {
        candidates.extend(parse_search_batch(&batch)?);
    }

    debug!("Parsed {} search results from stream", candidates.len());
    Ok(candidates)
}

/// Parse a single record batch from search results
fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchCandidate>> {
    let chunk_ids = string_column(batch, "chunk_id")?;
    let page_nos = string_column(batch, "page_no")?;
    let contents = string_column(batch, "content")?;

    let vectors = batch
        .column_by_name("vector")
        .ok_or_else(|| RagError::Database("Missing vector column".to_string()))?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| RagError::Database("Invalid vector column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut candidates = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let row_vector = vectors.value(row);
        let vector = row_vector
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| RagError::Database("Invalid vector item type".to_string()))?
            .values()
            .to_vec();

        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        candidates.push(SearchCandidate {
            document: IndexedDocument {
                content: contents.value(row).to_string(),
                metadata: DocumentMetadata {
                    chunk_id: chunk_ids.value(row).to_string(),
                    page_no: page_nos.value(row).to_string(),
                },
            },
            vector,
            distance,
        });
    }

    Ok(candidates)
}
