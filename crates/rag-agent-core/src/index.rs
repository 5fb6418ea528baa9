//! Immutable in-memory vector index.
//!
//! [`VectorIndex::build`] embeds every chunk in one pass and either returns
//! a complete index or an error; a partially embedded index is never
//! exposed. After construction the index is read-only, so it can be shared
//! behind an `Arc` and queried concurrently without locking.
//!
//! Queries are brute-force cosine similarity over all entries. Results are
//! ordered by descending score; equal scores keep insertion order.

use std::cmp::Ordering;

use tracing::debug;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::{EmbeddingError, IndexError};
use crate::models::{Chunk, RetrievalResult, ScoredChunk};

/// Number of chunk texts sent per embedding request when not configured.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// A stored (chunk, vector) pair.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embed all `chunks` with `provider` and build the index.
    ///
    /// Texts are sent in batches of `batch_size`. Any provider failure, a
    /// short response, or a vector whose length differs from the first one
    /// aborts the whole build.
    pub async fn build(
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let batch_size = batch_size.max(1);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = provider.embed_batch(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    got: embedded.len(),
                }
                .into());
            }
            vectors.extend(embedded);
            debug!(embedded = vectors.len(), total = chunks.len(), "embedding chunks");
        }

        Self::from_embeddings(provider.model_name(), chunks.into_iter().zip(vectors).collect())
    }

    /// Build an index from vectors computed elsewhere.
    ///
    /// All vectors must share one dimensionality.
    pub fn from_embeddings(
        model: &str,
        pairs: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<Self, IndexError> {
        let dims = pairs.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut entries = Vec::with_capacity(pairs.len());
        for (chunk, vector) in pairs {
            if vector.len() != dims {
                return Err(IndexError::Dimensions {
                    document: chunk.source.clone(),
                    position: chunk.position,
                    expected: dims,
                    got: vector.len(),
                });
            }
            entries.push(IndexEntry { chunk, vector });
        }
        Ok(Self {
            model: model.to_string(),
            dims,
            entries,
        })
    }

    /// Return the `k` entries closest to `vector`.
    ///
    /// The result has exactly `min(k, len)` hits, ordered by non-increasing
    /// similarity with ties broken by insertion order.
    pub fn query(&self, vector: &[f32], k: usize) -> RetrievalResult {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(vector, &e.vector)))
            .collect();

        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        RetrievalResult {
            hits: scored
                .into_iter()
                .map(|(i, score)| ScoredChunk {
                    chunk: self.entries[i].chunk.clone(),
                    score,
                })
                .collect(),
        }
    }

    /// Embedding model the index was built with.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of distinct source documents in the index.
    pub fn document_count(&self) -> usize {
        let mut sources: Vec<&str> = self.entries.iter().map(|e| e.chunk.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();
        sources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chunk, FixedEmbedder};

    fn sample_index() -> VectorIndex {
        VectorIndex::from_embeddings(
            "fixed",
            vec![
                (chunk("a", 0, "alpha"), vec![1.0, 0.0, 0.0]),
                (chunk("a", 1, "beta"), vec![0.0, 1.0, 0.0]),
                (chunk("b", 0, "gamma"), vec![0.0, 0.0, 1.0]),
                (chunk("b", 1, "delta"), vec![0.7, 0.7, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_query_returns_min_k_n() {
        let index = sample_index();
        assert_eq!(index.query(&[1.0, 0.0, 0.0], 2).len(), 2);
        assert_eq!(index.query(&[1.0, 0.0, 0.0], 10).len(), 4);
        assert_eq!(index.query(&[1.0, 0.0, 0.0], 0).len(), 0);
    }

    #[test]
    fn test_query_orders_by_similarity() {
        let index = sample_index();
        let result = index.query(&[0.9, 0.1, 0.0], 4);
        let scores: Vec<f32> = result.iter().map(|h| h.score).collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert_eq!(result.hits[0].chunk.text, "alpha");
    }

    #[test]
    fn test_self_query_ranks_first() {
        let index = sample_index();
        for entry in index.entries() {
            let result = index.query(&entry.vector, 1);
            assert_eq!(result.hits[0].chunk.id, entry.chunk.id);
        }
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = VectorIndex::from_embeddings(
            "fixed",
            vec![
                (chunk("a", 0, "first"), vec![1.0, 0.0]),
                (chunk("a", 1, "second"), vec![2.0, 0.0]),
                (chunk("a", 2, "third"), vec![3.0, 0.0]),
            ],
        )
        .unwrap();
        let result = index.query(&[1.0, 0.0], 3);
        let texts: Vec<&str> = result.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = VectorIndex::from_embeddings(
            "fixed",
            vec![
                (chunk("a", 0, "x"), vec![1.0, 0.0]),
                (chunk("a", 1, "y"), vec![1.0]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, IndexError::Dimensions { position: 1, .. }));
    }

    #[tokio::test]
    async fn test_build_embeds_in_batches() {
        let embedder = FixedEmbedder::new(&[("alpha", &[1.0, 0.0]), ("beta", &[0.0, 1.0]), ("gamma", &[0.5, 0.5])]);
        let chunks = vec![chunk("a", 0, "alpha"), chunk("a", 1, "beta"), chunk("b", 0, "gamma")];
        let index = VectorIndex::build(chunks, &embedder, 2).await.unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dims(), 2);
        assert_eq!(index.model(), "fixed");
        assert_eq!(index.document_count(), 2);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn test_build_fails_fast() {
        let embedder = FixedEmbedder::new(&[("alpha", &[1.0, 0.0])]).failing_on("beta");
        let chunks = vec![chunk("a", 0, "alpha"), chunk("a", 1, "beta")];
        let err = VectorIndex::build(chunks, &embedder, 1).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
    }
}
