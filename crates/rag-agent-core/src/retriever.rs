//! Query interface over a [`VectorIndex`].
//!
//! A [`Retriever`] embeds query text with the same provider the index was
//! built with and returns the top-k closest chunks. It holds no mutable
//! state and caches nothing, so identical queries against the same index
//! return identical results.

use std::sync::Arc;
use std::time::Duration;

use crate::embedding::EmbeddingProvider;
use crate::error::{EmbeddingError, RetrievalError};
use crate::index::VectorIndex;
use crate::models::RetrievalResult;

#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    default_k: usize,
    min_score: Option<f32>,
    timeout: Option<Duration>,
}

impl Retriever {
    /// Wrap `index` for querying with `provider`.
    ///
    /// Fails when the provider's model differs from the one that built the
    /// index: rankings across embedding spaces are meaningless.
    pub fn new(
        index: Arc<VectorIndex>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, RetrievalError> {
        if !index.is_empty() && index.model() != provider.model_name() {
            return Err(RetrievalError::ModelMismatch {
                index_model: index.model().to_string(),
                query_model: provider.model_name().to_string(),
            });
        }
        Ok(Self {
            index,
            provider,
            default_k: 4,
            min_score: None,
            timeout: None,
        })
    }

    /// Number of results returned by [`Retriever::retrieve_default`].
    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k;
        self
    }

    /// Drop hits scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// Bound the time spent embedding the query.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Return up to `k` chunks closest to `query`, closest first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, RetrievalError> {
        let embed = self.provider.embed(query);
        let vector = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, embed)
                .await
                .map_err(|_| EmbeddingError::Timeout(limit))??,
            None => embed.await?,
        };
        if !self.index.is_empty() && vector.len() != self.index.dims() {
            return Err(RetrievalError::Dimensions {
                expected: self.index.dims(),
                got: vector.len(),
            });
        }

        let mut result = self.index.query(&vector, k);
        if let Some(min) = self.min_score {
            result.hits.retain(|h| h.score >= min);
        }
        Ok(result)
    }

    pub async fn retrieve_default(&self, query: &str) -> Result<RetrievalResult, RetrievalError> {
        self.retrieve(query, self.default_k).await
    }
}
