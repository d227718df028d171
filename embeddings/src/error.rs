//! Error types for the embeddings system.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The text produced no token vectors (e.g. empty content).
    #[error("no content to embed")]
    EmptyContent,

    /// The embedder cannot be constructed or loaded.
    #[error("embedding model not available: {0}")]
    ModelUnavailable(String),

    /// The embedder raised during inference.
    #[error("embedding computation failed: {0}")]
    ComputationFailed(String),

    /// A held chunk has no cached vector at query time.
    #[error("missing cached vector for chunk {chunk_id}")]
    MissingCacheEntry { chunk_id: String },

    /// The embedder returned vectors of the wrong dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An embedding request did not complete in time.
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    /// The embedder worker has shut down.
    #[error("embedder worker stopped")]
    WorkerStopped,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
