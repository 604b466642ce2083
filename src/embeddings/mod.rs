// Embeddings module
// Page chunking and the embedding capability used for indexing and querying

pub mod chunking;

pub use chunking::{Chunk, ChunkIdSequence, ChunkingConfig, chunk_pages, split_text};

use crate::{RagError, Result};

/// Fixed text embedded once to learn the dimensionality of a model
pub const DIMENSION_PROBE: &str = "dimension probe";

/// Text embedding capability.
///
/// Implementations must be deterministic for identical input and return
/// vectors of one fixed dimension.
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors
    fn model_id(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Determine the vector dimension of an embedder by embedding a fixed probe
#[inline]
pub fn probe_dimension(embedder: &dyn Embedder) -> Result<usize> {
    let vector = embedder.embed(DIMENSION_PROBE)?;
    if vector.is_empty() {
        return Err(RagError::ExternalService(format!(
            "Embedding model '{}' returned an empty vector",
            embedder.model_id()
        )));
    }
    Ok(vector.len())
}
