//! Semantic search engine implementation.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use semindex_embeddings::cache::{DISTANCE_TIMER, POPULATE_TIMER, SORT_TIMER};
use semindex_embeddings::{
    Chunk, Embedder, EmbedderHandle, EmbeddingCache, HashingEmbedder, OpenAiEmbedder,
    PopulateReport, ScoredChunk, Timings,
};

use crate::config::{EmbedderConfig, EmbedderKind, RetrievalConfig};
use crate::corpus::load_chunks;
use crate::error::{Result, RetrievalError};

/// Semantic search over one corpus.
///
/// Wires configuration to an embedder worker and an [`EmbeddingCache`].
pub struct SemanticSearch {
    config: RetrievalConfig,
    cache: EmbeddingCache,
}

impl SemanticSearch {
    /// Build the engine with the embedder named in `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        let embedder = build_embedder(&config.embedder)?;
        Self::with_embedder(config, embedder)
    }

    /// Build the engine around an explicit embedder.
    pub fn with_embedder(config: RetrievalConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;

        let mut handle = EmbedderHandle::spawn(embedder)?;
        if let Some(timeout) = config.embedder.request_timeout() {
            handle = handle.with_timeout(timeout);
        }
        info!(
            embedder = handle.name(),
            dimension = handle.dimension(),
            "Initialized semantic search"
        );

        let cache = EmbeddingCache::new(handle, config.cache.clone());
        Ok(Self { config, cache })
    }

    /// The engine configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// The underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Timers recorded by the embedder worker and the cache.
    pub fn timings(&self) -> &Timings {
        self.cache.embedder().timings()
    }

    /// Load the configured corpus and index it.
    pub async fn load_configured_corpus(&self) -> Result<PopulateReport> {
        let path = self.config.corpus.clone().ok_or(RetrievalError::NoCorpus)?;
        self.load_corpus(path).await
    }

    /// Load a JSON chunk bundle and index it.
    pub async fn load_corpus(&self, path: impl AsRef<Path>) -> Result<PopulateReport> {
        let chunks = load_chunks(path)?;
        Ok(self.index(chunks).await)
    }

    /// Index `chunks`, replacing the previous corpus.
    ///
    /// Chunks that fail to embed are reported; questions asked afterwards
    /// fail until the corpus is indexed completely.
    pub async fn index(&self, chunks: Vec<Chunk>) -> PopulateReport {
        let report = self.cache.populate(chunks).await;
        if !report.is_complete() {
            warn!(
                failed = report.failed.len(),
                "Some chunks could not be embedded; queries will fail until they are"
            );
        }
        if self.config.query.report_timings {
            self.timings().report(POPULATE_TIMER);
        }
        report
    }

    /// The chunks closest to `question`.
    ///
    /// Uses `k` when given, otherwise the configured `top_k`.
    pub async fn ask(&self, question: &str, k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        if self.cache.stats().await.chunks == 0 {
            return Err(RetrievalError::NoCorpus);
        }

        let k = k.unwrap_or(self.config.query.top_k);
        debug!("Processing question: {question}");
        let results = self.cache.query_scored(question, k).await?;

        if self.config.query.report_timings {
            self.timings().report(DISTANCE_TIMER);
            self.timings().report(SORT_TIMER);
        }
        Ok(results)
    }

    /// Drop cached question vectors.
    pub async fn forget_questions(&self) {
        self.cache.invalidate_queries().await;
    }

    /// Drop every cached vector.
    pub async fn reset(&self) {
        self.cache.invalidate_all().await;
    }
}

/// Construct the embedder described by `config`.
pub fn build_embedder(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbedderKind::Hashing => {
            let embedder = match config.dimension {
                Some(dimension) => HashingEmbedder::new(dimension),
                None => HashingEmbedder::default(),
            };
            Ok(Arc::new(embedder))
        }
        EmbedderKind::OpenAi => {
            let mut embedder = OpenAiEmbedder::from_env(&config.api_key_env);
            if let Some(model) = &config.model {
                embedder = embedder.with_model(model);
            }
            if let Some(url) = &config.base_url {
                embedder = embedder.with_base_url(url);
            }
            if let Some(dimension) = config.dimension {
                embedder = embedder.with_dimensions(dimension);
            }
            Ok(Arc::new(embedder))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use semindex_embeddings::EmbeddingError;

    use super::*;

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("geo.txt", "https://example.com/geo", "Geo", "Berlin is the capital of Germany."),
            Chunk::new("geo.txt", "https://example.com/geo", "Geo", "Paris is the capital of France."),
            Chunk::new("food.txt", "https://example.com/food", "Food", "Bread is baked in an oven."),
        ]
    }

    #[tokio::test]
    async fn test_ask_before_index_is_no_corpus() {
        let engine = SemanticSearch::new(RetrievalConfig::default()).unwrap();
        assert!(matches!(
            engine.ask("anything", None).await,
            Err(RetrievalError::NoCorpus)
        ));
        assert!(matches!(
            engine.load_configured_corpus().await,
            Err(RetrievalError::NoCorpus)
        ));
    }

    #[tokio::test]
    async fn test_ask_uses_configured_top_k() {
        let engine = SemanticSearch::new(RetrievalConfig::default()).unwrap();
        let report = engine.index(chunks()).await;
        assert_eq!(report.embedded, 3);

        let results = engine.ask("What is the capital of France?", None).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.content, "Paris is the capital of France.");

        let one = engine.ask("What is the capital of France?", Some(1)).await.unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_empties_results() {
        let engine = SemanticSearch::new(RetrievalConfig::default()).unwrap();
        engine.index(chunks()).await;
        engine.reset().await;
        assert!(engine.ask("bread", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_openai_without_key_is_unavailable() {
        let config = RetrievalConfig::default().with_embedder(EmbedderConfig {
            provider: EmbedderKind::OpenAi,
            api_key_env: "SEMINDEX_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..EmbedderConfig::default()
        });
        assert!(matches!(
            SemanticSearch::new(config),
            Err(RetrievalError::Embedding(EmbeddingError::ModelUnavailable(_)))
        ));
    }

    #[test]
    fn test_build_hashing_embedder_dimension() {
        let config = EmbedderConfig {
            dimension: Some(32),
            ..EmbedderConfig::default()
        };
        let embedder = build_embedder(&config).unwrap();
        assert_eq!(embedder.name(), "hashing");
        assert_eq!(embedder.dimension(), 32);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = RetrievalConfig::default();
        config.query.top_k = 0;
        assert!(matches!(
            SemanticSearch::new(config),
            Err(RetrievalError::Config(_))
        ));
    }
}
