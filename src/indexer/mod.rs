// Indexer module
// One-shot document pipeline: discover pages, describe, chunk, embed and store

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::database::{DocumentSource, IndexHandle};
use crate::embeddings::{ChunkIdSequence, ChunkingConfig, chunk_pages};
use crate::extract::{Page, PageDescriber, discover_pages, extract_pages};
use crate::{RagError, Result};

/// Statistics about one ingested document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub collection: String,
    pub pages: usize,
    pub empty_pages: usize,
    pub chunks_created: usize,
    pub documents_indexed: usize,
    /// Documents in the collection after ingestion
    pub total_documents: usize,
    /// The collection already held documents and was used as is
    pub reused_existing: bool,
}

impl IngestReport {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_documents == 0
    }
}

/// Runs documents through extraction, chunking and indexing.
///
/// Chunk ids come from a shared sequence so they stay unique across every
/// document this indexer sees.
pub struct DocumentIndexer {
    describer: Arc<dyn PageDescriber>,
    chunking: ChunkingConfig,
    sequence: Arc<ChunkIdSequence>,
}

impl std::fmt::Debug for DocumentIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndexer")
            .field("chunking", &self.chunking)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl DocumentIndexer {
    #[inline]
    pub fn new(
        describer: Arc<dyn PageDescriber>,
        chunking: ChunkingConfig,
        sequence: Arc<ChunkIdSequence>,
    ) -> Self {
        Self {
            describer,
            chunking,
            sequence,
        }
    }

    #[inline]
    pub fn sequence(&self) -> &Arc<ChunkIdSequence> {
        &self.sequence
    }

    /// Keep new chunk ids clear of those already stored in `index`
    #[inline]
    pub async fn resume_sequence(&self, index: &IndexHandle) -> Result<()> {
        if let Some(max_id) = index.max_chunk_id().await? {
            self.sequence.advance_past(max_id);
            debug!(
                "Chunk ids for '{}' continue after {}",
                index.collection(),
                max_id
            );
        }
        Ok(())
    }

    /// Ingest a document into `index`.
    ///
    /// A collection that already holds this same document is reused without
    /// describing it again. The document's canonical path is recorded with the
    /// collection once ingestion succeeds.
    ///
    /// # Errors
    /// * `RagError::Config` if the collection holds documents from another source
    #[inline]
    pub async fn ingest(&self, document: &Path, index: &IndexHandle) -> Result<IngestReport> {
        let source = DocumentSource::for_document(document)?;
        self.resume_sequence(index).await?;

        let existing = index.count().await?;
        if existing > 0 {
            match index.source().await? {
                Some(stored) if stored.is_same_document(&source) => {}
                Some(stored) => {
                    return Err(RagError::Config(format!(
                        "Collection '{}' already holds {} (ingested {}); choose another collection name for {}",
                        index.collection(),
                        stored.document.display(),
                        stored.ingested_at,
                        source.document.display()
                    )));
                }
                None => {
                    return Err(RagError::Config(format!(
                        "Collection '{}' holds {} documents from an unrecorded source; choose another collection name for {}",
                        index.collection(),
                        existing,
                        source.document.display()
                    )));
                }
            }

            info!(
                "Collection '{}' already holds {} documents, reusing it",
                index.collection(),
                existing
            );
            return Ok(IngestReport {
                collection: index.collection().to_string(),
                pages: 0,
                empty_pages: 0,
                chunks_created: 0,
                documents_indexed: 0,
                total_documents: existing,
                reused_existing: true,
            });
        }

        let sources = discover_pages(document)?;
        info!(
            "Found {} pages in {}",
            sources.len(),
            document.display()
        );

        let describer = Arc::clone(&self.describer);
        let pages = tokio::task::spawn_blocking(move || extract_pages(&sources, describer.as_ref()))
            .await
            .map_err(|e| RagError::ExternalService(format!("Page extraction task failed: {}", e)))??;

        let report = self.ingest_pages(&pages, index).await?;
        index.record_source(&source).await?;
        Ok(report)
    }

    /// Chunk already extracted pages and add them to `index`
    #[inline]
    pub async fn ingest_pages(&self, pages: &[Page], index: &IndexHandle) -> Result<IngestReport> {
        let empty_pages = pages.iter().filter(|p| p.text.trim().is_empty()).count();
        let chunks = chunk_pages(pages, &self.chunking, &self.sequence);
        let chunks_created = chunks.len();

        if chunks.is_empty() {
            let error = RagError::EmptyInput(format!(
                "{} pages produced no chunks for '{}'",
                pages.len(),
                index.collection()
            ));
            warn!("{}", error);
        }

        let documents_indexed = index.add(chunks).await?;
        let total_documents = index.count().await?;

        info!(
            "Indexed {} chunks from {} pages into '{}' ({} documents total)",
            documents_indexed,
            pages.len(),
            index.collection(),
            total_documents
        );

        Ok(IngestReport {
            collection: index.collection().to_string(),
            pages: pages.len(),
            empty_pages,
            chunks_created,
            documents_indexed,
            total_documents,
            reused_existing: false,
        })
    }
}
