//! Embedding cache for chunk retrieval.
//!
//! [`EmbeddingCache`] owns the chunk set, the content-keyed vector cache and
//! the query vector cache. All of its state sits behind one async mutex that
//! is held for the whole of every operation, so population, queries and
//! invalidation run one at a time and never observe a half-cleared cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::error::{EmbeddingError, Result};
use crate::vector::{MAX_DISTANCE, PoolingStrategy, SimilarityStrategy, cosine_distance};
use crate::worker::EmbedderHandle;
use crate::Embedding;

/// Timer covering a whole population run.
pub const POPULATE_TIMER: &str = "populate";

/// Timer covering the distance pass of a query.
pub const DISTANCE_TIMER: &str = "distances";

/// Timer covering the sort of a query.
pub const SORT_TIMER: &str = "sort";

/// Configuration for an [`EmbeddingCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Pooling used for chunk and query vectors.
    pub pooling: PoolingStrategy,

    /// Similarity used for ranking.
    pub similarity: SimilarityStrategy,

    /// Maximum population tasks in flight.
    pub max_in_flight: usize,

    /// Reuse vectors already cached for a chunk id instead of recomputing.
    pub skip_cached: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pooling: PoolingStrategy::default(),
            similarity: SimilarityStrategy::default(),
            max_in_flight: 16,
            skip_cached: true,
        }
    }
}

/// A chunk whose vector could not be computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedChunk {
    /// Content id of the chunk.
    pub id: String,

    /// Why embedding failed.
    pub error: String,
}

/// Outcome of one [`EmbeddingCache::populate`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    /// Chunks handed to populate, duplicates included.
    pub chunks: usize,

    /// Vectors computed and written to the cache.
    pub embedded: usize,

    /// Ids whose cached vector was kept.
    pub reused: usize,

    /// Chunks skipped because embedding failed.
    pub failed: Vec<FailedChunk>,
}

impl PopulateReport {
    /// Whether every distinct chunk has a cached vector.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A query result with its cosine distance.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f64,
}

/// Sizes of the cache's collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Chunks currently held.
    pub chunks: usize,

    /// Cached chunk vectors.
    pub vectors: usize,

    /// Cached query vectors.
    pub query_vectors: usize,
}

#[derive(Default)]
struct CacheState {
    /// Held chunks in corpus order, with their content ids.
    chunks: Vec<(String, Chunk)>,
    vectors: HashMap<String, Embedding>,
    query_vectors: HashMap<String, Embedding>,
}

/// Cache of chunk and query vectors answering k-nearest queries.
pub struct EmbeddingCache {
    embedder: EmbedderHandle,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl EmbeddingCache {
    /// Create an empty cache backed by `embedder`.
    pub fn new(embedder: EmbedderHandle, config: CacheConfig) -> Self {
        Self {
            embedder,
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The embedder handle, whose timings include this cache's timers.
    pub fn embedder(&self) -> &EmbedderHandle {
        &self.embedder
    }

    /// Replace the held chunks and embed them.
    ///
    /// A chunk whose vector cannot be computed is logged, reported and
    /// skipped; population always runs to the end. Cached vectors for other
    /// ids are kept.
    pub async fn populate(&self, chunks: Vec<Chunk>) -> PopulateReport {
        let timings = Arc::clone(self.embedder.timings());
        timings
            .track_async(POPULATE_TIMER, self.populate_locked(chunks))
            .await
    }

    async fn populate_locked(&self, chunks: Vec<Chunk>) -> PopulateReport {
        let mut state = self.state.lock().await;
        let mut report = PopulateReport {
            chunks: chunks.len(),
            ..PopulateReport::default()
        };

        let held: Vec<(String, Chunk)> = chunks.into_iter().map(|c| (c.id(), c)).collect();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for (id, chunk) in &held {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if self.config.skip_cached && state.vectors.contains_key(id) {
                report.reused += 1;
                continue;
            }
            pending.push((id.clone(), chunk.content.clone()));
        }

        info!(
            chunks = report.chunks,
            pending = pending.len(),
            reused = report.reused,
            "Populating embedding cache"
        );

        let limit = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        let mut task_ids = HashMap::new();
        let order: Vec<String> = pending.iter().map(|(id, _)| id.clone()).collect();
        for (id, content) in pending {
            let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
                break;
            };
            let embedder = self.embedder.clone();
            let pooling = self.config.pooling;
            let chunk_id = id.clone();
            let handle = tasks.spawn(async move {
                let result = embedder.vector(&content, pooling).await;
                drop(permit);
                (chunk_id, result)
            });
            task_ids.insert(handle.id(), id);
        }

        let mut errors = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (id, result) = match joined {
                Ok(outcome) => outcome,
                // Pooling runs on the task and panics on mixed dimensions.
                Err(err) => {
                    let id = task_ids.remove(&err.id()).unwrap_or_default();
                    (id, Err(EmbeddingError::ComputationFailed(err.to_string())))
                }
            };
            match result {
                Ok(vector) => {
                    state.vectors.insert(id, vector);
                    report.embedded += 1;
                }
                Err(err) => {
                    warn!(chunk_id = %id, "Failed to compute vector for chunk: {err}");
                    errors.insert(id, err.to_string());
                }
            }
        }
        report.failed = order
            .into_iter()
            .filter_map(|id| errors.remove(&id).map(|error| FailedChunk { id, error }))
            .collect();

        state.chunks = held;
        info!(
            embedded = report.embedded,
            failed = report.failed.len(),
            cached = state.vectors.len(),
            "Embedding cache populated"
        );
        report
    }

    /// The `k` held chunks closest to `text`.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<Chunk>> {
        let scored = self.query_scored(text, k).await?;
        Ok(scored.into_iter().map(|s| s.chunk).collect())
    }

    /// The `k` held chunks closest to `text`, with their distances.
    ///
    /// Results are sorted by ascending distance, ties kept in corpus order.
    /// Returns nothing when `k` is zero or no vectors are cached. Fails with
    /// [`EmbeddingError::MissingCacheEntry`] if a held chunk has no cached
    /// vector, rather than ranking a partial corpus.
    pub async fn query_scored(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let mut state = self.state.lock().await;
        if k == 0 || state.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = if let Some(cached) = state.query_vectors.get(text).cloned() {
            debug!("Query vector cache hit");
            cached
        } else {
            let vector = self.embedder.vector(text, self.config.pooling).await?;
            state
                .query_vectors
                .insert(text.to_string(), vector.clone());
            vector
        };

        let timings = self.embedder.timings();
        let state = &*state;
        let mut scored = timings.track(DISTANCE_TIMER, || {
            state
                .chunks
                .iter()
                .map(|(id, chunk)| -> Result<ScoredChunk> {
                    let vector = state.vectors.get(id).ok_or_else(|| {
                        EmbeddingError::MissingCacheEntry {
                            chunk_id: id.clone(),
                        }
                    })?;
                    let distance = cosine_distance(&query_vector, vector, self.config.similarity)
                        .unwrap_or(MAX_DISTANCE);
                    Ok(ScoredChunk {
                        chunk: chunk.clone(),
                        distance,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;

        timings.track(SORT_TIMER, || {
            scored.sort_by_key(|s| OrderedFloat(s.distance));
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Forget cached query vectors.
    pub async fn invalidate_queries(&self) {
        self.state.lock().await.query_vectors.clear();
        debug!("Cleared query vector cache");
    }

    /// Forget all cached vectors. Queries return nothing until the next
    /// [`EmbeddingCache::populate`].
    pub async fn invalidate_all(&self) {
        let mut state = self.state.lock().await;
        state.vectors.clear();
        state.query_vectors.clear();
        info!("Cleared embedding cache");
    }

    /// Whether a vector is cached for `chunk`.
    pub async fn contains(&self, chunk: &Chunk) -> bool {
        self.state.lock().await.vectors.contains_key(&chunk.id())
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            chunks: state.chunks.len(),
            vectors: state.vectors.len(),
            query_vectors: state.query_vectors.len(),
        }
    }
}
