//! # Embeddings
//!
//! This crate provides the embedding cache and nearest-neighbor retrieval
//! engine behind semantic chunk search.
//!
//! ## Features
//!
//! - **Vector Math**: Mean pooling and cosine similarity, each with
//!   interchangeable scalar and vectorized implementations
//! - **Content Addressing**: Chunks are identified by the SHA-256 of their content
//! - **Serialized Inference**: One worker task owns the embedder; every
//!   request funnels through it
//! - **Caching**: Chunk vectors keyed by content id, query vectors keyed by text
//! - **Ranking**: Exact brute-force top-k by cosine distance
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Embedder ──► EmbedderHandle ──► mean_pool ──► EmbeddingCache   │
//! │                     │                               │           │
//! │                     ▼                               ▼           │
//! │          NearestNeighborFinder            cosine_similarity     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use semindex_embeddings::{CacheConfig, EmbedderHandle, EmbeddingCache, HashingEmbedder};
//!
//! let handle = EmbedderHandle::spawn(Arc::new(HashingEmbedder::default()))?;
//! let cache = EmbeddingCache::new(handle, CacheConfig::default());
//! cache.populate(chunks).await;
//! let closest = cache.query("What is the capital of France?", 3).await?;
//! ```

pub mod cache;
pub mod chunk;
pub mod error;
pub mod finder;
pub mod provider;
pub mod timing;
pub mod vector;
pub mod worker;

pub use cache::{CacheConfig, CacheStats, EmbeddingCache, FailedChunk, PopulateReport, ScoredChunk};
pub use chunk::{Chunk, Embeddable};
pub use error::{EmbeddingError, Result};
pub use finder::NearestNeighborFinder;
pub use provider::{Embedder, HashingEmbedder, OpenAiEmbedder, TokenEmbedding};
pub use timing::{TimerStats, Timings};
pub use vector::{
    MAX_DISTANCE, PoolingStrategy, SimilarityStrategy, cosine_distance, cosine_similarity_iter,
    cosine_similarity_loop, cosine_similarity_simd, mean_pool_scalar, mean_pool_vectorized,
};
pub use worker::EmbedderHandle;

/// A dense vector embedding.
pub type Embedding = Vec<f64>;

/// Dimension used by the local hashing embedder unless configured otherwise.
pub const DEFAULT_DIMENSION: usize = 512;
