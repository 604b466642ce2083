// Index manager
// Creates or reloads named collections and tracks the active one


use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::database::lancedb::{DocumentSource, IndexedDocument};
use crate::database::lancedb::vector_store::{SearchCandidate, VectorIndex};
use crate::embeddings::{Chunk, Embedder, probe_dimension};
use crate::{RagError, Result};

/// Shared handle to an opened collection.
///
/// Access to the underlying table is serialized through an async mutex. The
/// handle carries the embedder the collection was built with so documents and
/// queries are embedded into the same vector space.
#[derive(Clone)]
pub struct IndexHandle {
    index: Arc<Mutex<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    dimension: usize,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .field("embedder", &self.embedder.model_id())
            .finish_non_exhaustive()
    }
}

impl IndexHandle {
    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed and store chunks, skipping any whose text is blank
    ///
    /// # Returns
    /// * `Result<usize>` - Number of documents stored
    #[inline]
    pub async fn add(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let documents: Vec<IndexedDocument> = chunks
            .into_iter()
            .filter(|chunk| !chunk.text.trim().is_empty())
            .map(IndexedDocument::from)
            .collect();

        if documents.is_empty() {
            debug!("No documents to add to '{}'", self.collection);
            return Ok(0);
        }

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = embed_blocking(&self.embedder, texts).await?;

        let index = self.index.lock().await;
        index.insert(&documents, &vectors).await
    }

    /// Embed a query with the collection's embedder
    #[inline]
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = embed_blocking(&self.embedder, vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::ExternalService("Empty embedding response".to_string()))
    }

    /// Exact nearest neighbours of a query vector, closest first
    #[inline]
    pub async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchCandidate>> {
        let index = self.index.lock().await;
        index.search(query_vector, limit).await
    }

    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let index = self.index.lock().await;
        index.count().await
    }

    #[inline]
    pub async fn max_chunk_id(&self) -> Result<Option<u64>> {
        let index = self.index.lock().await;
        index.max_chunk_id().await
    }

    /// Document the collection was built from, if recorded
    #[inline]
    pub async fn source(&self) -> Result<Option<DocumentSource>> {
        self.index.lock().await.source()
    }

    #[inline]
    pub async fn record_source(&self, source: &DocumentSource) -> Result<()> {
        self.index.lock().await.record_source(source)
    }

    #[inline]
    pub async fn path(&self) -> PathBuf {
        self.index.lock().await.path().to_path_buf()
    }
}

async fn embed_blocking(embedder: &Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let embedder = Arc::clone(embedder);
    tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| RagError::ExternalService(format!("Embedding task failed: {}", e)))?
}

/// Opens collections under one persistence directory and remembers the active one
pub struct IndexManager {
    persist_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    active: Option<IndexHandle>,
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("persist_dir", &self.persist_dir)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl IndexManager {
    #[inline]
    pub fn new(persist_dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            persist_dir: persist_dir.into(),
            embedder,
            active: None,
        }
    }

    /// Load the named collection, or create it empty, and make it active.
    ///
    /// The vector dimension is learned by embedding a fixed probe text; an
    /// existing collection built with a different dimension is rejected.
    #[inline]
    pub async fn init(&mut self, collection: &str) -> Result<IndexHandle> {
        let dimension = self.probe().await?;
        let index = VectorIndex::open_or_create(&self.persist_dir, collection, dimension).await?;
        Ok(self.activate(index))
    }

    /// Make an existing collection active without creating anything on disk
    ///
    /// # Errors
    /// * `RagError::NotInitialized` if no such collection has been created
    #[inline]
    pub async fn open(&mut self, collection: &str) -> Result<IndexHandle> {
        if !VectorIndex::exists(&self.persist_dir, collection) {
            return Err(RagError::NotInitialized(format!(
                "No collection named '{}' has been ingested",
                collection.trim()
            )));
        }

        let dimension = self.probe().await?;
        let index = VectorIndex::open(&self.persist_dir, collection, dimension).await?;
        Ok(self.activate(index))
    }

    async fn probe(&self) -> Result<usize> {
        let embedder = Arc::clone(&self.embedder);
        let dimension = tokio::task::spawn_blocking(move || probe_dimension(embedder.as_ref()))
            .await
            .map_err(|e| RagError::ExternalService(format!("Embedding task failed: {}", e)))??;

        debug!(
            "Embedding model '{}' produces {} dimensions",
            self.embedder.model_id(),
            dimension
        );
        Ok(dimension)
    }

    fn activate(&mut self, index: VectorIndex) -> IndexHandle {
        if self.active.is_some() {
            warn!("Replacing active index with collection '{}'", index.collection());
        }

        let handle = IndexHandle {
            collection: index.collection().to_string(),
            dimension: index.dimension(),
            index: Arc::new(Mutex::new(index)),
            embedder: Arc::clone(&self.embedder),
        };

        info!("Active index is now '{}'", handle.collection);
        self.active = Some(handle.clone());
        handle
    }

    /// The active index
    ///
    /// # Errors
    /// * `RagError::NotInitialized` before the first successful [`IndexManager::init`]
    #[inline]
    pub fn get_active(&self) -> Result<IndexHandle> {
        self.active.clone().ok_or_else(|| {
            RagError::NotInitialized("No vector index has been initialized".to_string())
        })
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Forget the active index; persisted data is left untouched
    #[inline]
    pub fn reset(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!("Cleared active index '{}'", handle.collection);
        }
    }
}
