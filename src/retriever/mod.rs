// Retriever module
// Relevant and diverse documents for a query: flat L2 over-fetch, then MMR


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::{IndexHandle, IndexManager, IndexedDocument};
use crate::{RagError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Documents returned per query
    pub k: usize,
    /// Candidates fetched by distance before re-ranking
    pub fetch_k: usize,
    /// Relevance/diversity trade-off: 1.0 is pure relevance, 0.0 pure diversity
    pub lambda_mult: f32,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            k: 5,
            fetch_k: 20,
            lambda_mult: 0.5,
        }
    }
}

/// Source of context documents for a question
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<IndexedDocument>>;
}

/// Maximal-marginal-relevance retriever over one vector index
#[derive(Debug, Clone)]
pub struct Retriever {
    index: IndexHandle,
    fetch_k: usize,
    lambda_mult: f32,
}

impl Retriever {
    /// # Errors
    /// * `RagError::InvalidIndex` when no index is given
    #[inline]
    pub fn new(index: Option<IndexHandle>, config: &RetrievalConfig) -> Result<Self> {
        let index = index.ok_or_else(|| {
            RagError::InvalidIndex("A retriever requires an initialized vector index".to_string())
        })?;

        Ok(Self {
            index,
            fetch_k: config.fetch_k,
            lambda_mult: config.lambda_mult.clamp(0.0, 1.0),
        })
    }

    /// Retriever over the manager's active index
    #[inline]
    pub fn from_manager(manager: &IndexManager, config: &RetrievalConfig) -> Result<Self> {
        Self::new(manager.get_active().ok(), config)
    }

    #[inline]
    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Up to `k` documents for `query`, chosen by maximal marginal relevance.
    ///
    /// When the index holds no more than `k` candidates they are all returned,
    /// most relevant first.
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<IndexedDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.index.embed_query(query).await?;
        if query_vector.len() != self.index.dimension() {
            return Err(RagError::InvalidIndex(format!(
                "Query embedding has dimension {} but index '{}' stores {} dimensions",
                query_vector.len(),
                self.index.collection(),
                self.index.dimension()
            )));
        }

        let fetch_k = self.fetch_k.max(k);
        let candidates = self.index.search(&query_vector, fetch_k).await?;
        debug!(
            "Fetched {} candidates for MMR selection of {}",
            candidates.len(),
            k
        );

        if candidates.len() <= k {
            return Ok(candidates.into_iter().map(|c| c.document).collect());
        }

        let vectors: Vec<&[f32]> = candidates.iter().map(|c| c.vector.as_slice()).collect();
        let selected = maximal_marginal_relevance(&query_vector, &vectors, k, self.lambda_mult);

        let mut slots: Vec<Option<IndexedDocument>> =
            candidates.into_iter().map(|c| Some(c.document)).collect();
        Ok(selected
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect())
    }
}

#[async_trait]
impl DocumentRetriever for Retriever {
    #[inline]
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<IndexedDocument>> {
        Self::retrieve(self, query, k).await
    }
}

/// Cosine similarity; zero when either vector has no magnitude
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Indices of `k` candidates selected by maximal marginal relevance.
///
/// The first pick is the candidate most similar to the query. Each further pick
/// maximizes `lambda * sim(query, c) - (1 - lambda) * max(sim(c, selected))`;
/// ties go to the earlier candidate.
#[inline]
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda_mult: f32,
) -> Vec<usize> {
    let limit = k.min(candidates.len());
    if limit == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut selected = Vec::with_capacity(limit);
    // Highest similarity of each candidate to anything selected so far
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];

    while selected.len() < limit {
        let mut best: Option<(usize, f32)> = None;

        for (i, &score) in relevance.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let mmr_score = if selected.is_empty() {
                score
            } else {
                lambda_mult * score - (1.0 - lambda_mult) * redundancy[i]
            };
            if best.is_none_or(|(_, best_score)| mmr_score > best_score) {
                best = Some((i, mmr_score));
            }
        }

        let Some((pick, _)) = best else { break };
        selected.push(pick);

        for (i, candidate) in candidates.iter().enumerate() {
            redundancy[i] = redundancy[i].max(cosine_similarity(candidates[pick], candidate));
        }
    }

    selected
}
