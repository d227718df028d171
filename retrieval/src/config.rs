//! Configuration for semantic search.
//!
//! Loaded from TOML. Every section is optional:
//!
//! ```toml
//! corpus = "merged_chunks.json"
//!
//! [embedder]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! request_timeout_secs = 30
//!
//! [cache]
//! pooling = "vectorized"
//! similarity = "simd"
//! max_in_flight = 8
//!
//! [query]
//! top_k = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use semindex_embeddings::CacheConfig;

use crate::error::{Result, RetrievalError};

/// Configuration for the semantic search engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// JSON chunk bundle to index.
    pub corpus: Option<PathBuf>,

    /// Embedding model configuration.
    pub embedder: EmbedderConfig,

    /// Embedding cache configuration.
    pub cache: CacheConfig,

    /// Query configuration.
    pub query: QueryConfig,
}

impl RetrievalConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RetrievalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| RetrievalError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Set the corpus path.
    pub fn with_corpus(mut self, corpus: impl Into<PathBuf>) -> Self {
        self.corpus = Some(corpus.into());
        self
    }

    /// Set the embedder configuration.
    pub fn with_embedder(mut self, embedder: EmbedderConfig) -> Self {
        self.embedder = embedder;
        self
    }

    /// Set the cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.query.top_k == 0 {
            return Err(RetrievalError::Config("query.top_k must be positive".to_string()));
        }
        if self.cache.max_in_flight == 0 {
            return Err(RetrievalError::Config(
                "cache.max_in_flight must be positive".to_string(),
            ));
        }
        if self.embedder.dimension == Some(0) {
            return Err(RetrievalError::Config(
                "embedder.dimension must be positive".to_string(),
            ));
        }
        if self.embedder.request_timeout_secs == Some(0) {
            return Err(RetrievalError::Config(
                "embedder.request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Which embedder to use.
    pub provider: EmbedderKind,

    /// Model name (provider-specific).
    pub model: Option<String>,

    /// Output dimension.
    pub dimension: Option<usize>,

    /// API base URL for HTTP providers.
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Per-request timeout.
    pub request_timeout_secs: Option<u64>,
}

impl EmbedderConfig {
    /// Per-request timeout, if configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderKind::Hashing,
            model: None,
            dimension: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: None,
        }
    }
}

/// Type of embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Local feature-hashing embedder.
    Hashing,
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAi,
}

/// Configuration for queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of chunks returned per question.
    pub top_k: usize,

    /// Log timer stats after each question.
    pub report_timings: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            report_timings: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use semindex_embeddings::{PoolingStrategy, SimilarityStrategy};
    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = RetrievalConfig::default();
        assert_eq!(config.embedder.provider, EmbedderKind::Hashing);
        assert_eq!(config.query.top_k, 3);
        assert_eq!(config.cache, CacheConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
            corpus = "chunks.json"

            [embedder]
            provider = "openai"
            model = "text-embedding-3-large"
            request_timeout_secs = 30

            [cache]
            pooling = "vectorized"
            similarity = "simd"
            max_in_flight = 4

            [query]
            top_k = 5
            "#,
        );

        let config = RetrievalConfig::load(file.path()).unwrap();
        assert_eq!(config.corpus, Some(PathBuf::from("chunks.json")));
        assert_eq!(config.embedder.provider, EmbedderKind::OpenAi);
        assert_eq!(config.embedder.model.as_deref(), Some("text-embedding-3-large"));
        assert_eq!(config.embedder.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.embedder.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.cache.pooling, PoolingStrategy::Vectorized);
        assert_eq!(config.cache.similarity, SimilarityStrategy::Simd);
        assert_eq!(config.cache.max_in_flight, 4);
        assert!(config.cache.skip_cached);
        assert_eq!(config.query.top_k, 5);
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        let file = write_config("");
        assert_eq!(RetrievalConfig::load(file.path()).unwrap(), RetrievalConfig::default());
    }

    #[test]
    fn test_builders_replace_sections() {
        let cache = CacheConfig {
            pooling: PoolingStrategy::Vectorized,
            max_in_flight: 0,
            ..CacheConfig::default()
        };
        let config = RetrievalConfig::default()
            .with_corpus("chunks.json")
            .with_cache(cache.clone());

        assert_eq!(config.cache, cache);
        assert_eq!(config.corpus, Some(PathBuf::from("chunks.json")));
        assert!(matches!(config.validate(), Err(RetrievalError::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config("[query]\ntop_k = 0\n");
        assert!(matches!(
            RetrievalConfig::load(file.path()),
            Err(RetrievalError::Config(_))
        ));
    }

    #[test]
    fn test_parse_error_names_file() {
        let file = write_config("[embedder]\nprovider = \"nonsense\"\n");
        let err = RetrievalConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, RetrievalError::ConfigParse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_missing_file() {
        let err = RetrievalConfig::load("/nonexistent/semindex.toml").unwrap_err();
        assert!(matches!(err, RetrievalError::Io { .. }));
    }
}
