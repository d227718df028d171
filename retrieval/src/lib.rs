//! # Retrieval Engine
//!
//! This crate puts a configured front on the embedding cache:
//!
//! - **Configuration**: TOML file selecting the embedder, strategies and `top_k`
//! - **Corpus loading**: JSON chunk bundles
//! - **Semantic search**: index a corpus once, then ask questions against it
//!
//! ## Usage
//!
//! ```rust,ignore
//! use semindex_retrieval::{RetrievalConfig, SemanticSearch};
//!
//! let config = RetrievalConfig::load("semindex.toml")?;
//! let engine = SemanticSearch::new(config)?;
//! engine.load_configured_corpus().await?;
//!
//! let results = engine.ask("What is the capital of France?", None).await?;
//! ```

pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;

pub use config::{EmbedderConfig, EmbedderKind, QueryConfig, RetrievalConfig};
pub use corpus::load_chunks;
pub use engine::{SemanticSearch, build_embedder};
pub use error::{Result, RetrievalError};

// Re-export from dependencies for convenience
pub use semindex_embeddings::{CacheConfig, Chunk, PopulateReport, ScoredChunk};
