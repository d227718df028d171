//! Uncached nearest-neighbor search for small, ad-hoc comparisons.

use std::sync::Arc;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::chunk::Embeddable;
use crate::error::Result;
use crate::provider::Embedder;
use crate::vector::{MAX_DISTANCE, PoolingStrategy, SimilarityStrategy, cosine_distance};
use crate::worker::EmbedderHandle;

/// Ranks text-bearing items against a query without keeping any vectors.
///
/// Every call embeds the query and each item afresh, so it costs n + 1
/// embedding requests. Any failure aborts the whole ranking.
#[derive(Clone)]
pub struct NearestNeighborFinder {
    embedder: EmbedderHandle,
    pooling: PoolingStrategy,
    similarity: SimilarityStrategy,
}

impl NearestNeighborFinder {
    /// Spawn a worker for `embedder` and build a finder on it.
    pub fn new(embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self::with_handle(EmbedderHandle::spawn(embedder)?))
    }

    /// Build a finder on an existing worker.
    pub fn with_handle(embedder: EmbedderHandle) -> Self {
        Self {
            embedder,
            pooling: PoolingStrategy::default(),
            similarity: SimilarityStrategy::default(),
        }
    }

    /// Set the pooling strategy.
    pub fn with_pooling(mut self, pooling: PoolingStrategy) -> Self {
        self.pooling = pooling;
        self
    }

    /// Set the similarity strategy.
    pub fn with_similarity(mut self, similarity: SimilarityStrategy) -> Self {
        self.similarity = similarity;
        self
    }

    /// Cosine distance between two texts.
    pub async fn distance(&self, a: &str, b: &str) -> Result<f64> {
        let first = self.embedder.vector(a, self.pooling).await?;
        let second = self.embedder.vector(b, self.pooling).await?;
        Ok(cosine_distance(&first, &second, self.similarity).unwrap_or(MAX_DISTANCE))
    }

    /// The `k` items closest to `query`, ties kept in input order.
    pub async fn find_closest<'a, T: Embeddable>(
        &self,
        query: &str,
        items: &'a [T],
        k: usize,
    ) -> Result<Vec<&'a T>> {
        if k == 0 || items.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.vector(query, self.pooling).await?;
        let mut ranked = Vec::with_capacity(items.len());
        for item in items {
            let vector = self.embedder.vector(item.content(), self.pooling).await?;
            let distance =
                cosine_distance(&query_vector, &vector, self.similarity).unwrap_or(MAX_DISTANCE);
            ranked.push((OrderedFloat(distance), item));
        }
        debug!("Ranked {} items without caching", ranked.len());

        ranked.sort_by_key(|(distance, _)| *distance);
        Ok(ranked.into_iter().take(k).map(|(_, item)| item).collect())
    }
}
