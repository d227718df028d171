//! End-to-end ranking through the cache and the uncached finder.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use semindex_embeddings::{
    CacheConfig, Chunk, EmbedderHandle, EmbeddingCache, HashingEmbedder, NearestNeighborFinder,
    PoolingStrategy, SimilarityStrategy,
};

const QUESTION: &str = "What is the capital of France?";

fn capitals() -> Vec<Chunk> {
    vec![
        Chunk::new(
            "europe_001.txt",
            "https://example.com/europe",
            "Capitals",
            "Berlin is the capital of Germany.",
        ),
        Chunk::new(
            "europe_002.txt",
            "https://example.com/europe",
            "Capitals",
            "Paris is the capital of France.",
        ),
    ]
}

fn strategies() -> Vec<(PoolingStrategy, SimilarityStrategy)> {
    let mut all = Vec::new();
    for pooling in [PoolingStrategy::Scalar, PoolingStrategy::Vectorized] {
        for similarity in [
            SimilarityStrategy::Loop,
            SimilarityStrategy::Iterator,
            SimilarityStrategy::Simd,
        ] {
            all.push((pooling, similarity));
        }
    }
    all
}

#[tokio::test]
async fn test_cache_ranks_paris_first_for_every_strategy() {
    for (pooling, similarity) in strategies() {
        let handle = EmbedderHandle::spawn(Arc::new(HashingEmbedder::default())).unwrap();
        let cache = EmbeddingCache::new(
            handle,
            CacheConfig {
                pooling,
                similarity,
                ..CacheConfig::default()
            },
        );

        let report = cache.populate(capitals()).await;
        assert!(report.is_complete());

        let closest = cache.query(QUESTION, 1).await.unwrap();
        assert_eq!(closest.len(), 1);
        assert_eq!(
            closest[0].content, "Paris is the capital of France.",
            "{pooling:?}/{similarity:?}"
        );

        let scored = cache.query_scored(QUESTION, 2).await.unwrap();
        assert!(scored[0].distance < scored[1].distance);
    }
}

#[tokio::test]
async fn test_finder_agrees_with_cache() {
    let chunks = capitals();
    for (pooling, similarity) in strategies() {
        let finder = NearestNeighborFinder::new(Arc::new(HashingEmbedder::default()))
            .unwrap()
            .with_pooling(pooling)
            .with_similarity(similarity);

        let closest = finder.find_closest(QUESTION, &chunks, 2).await.unwrap();
        let contents: Vec<&str> = closest.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "Paris is the capital of France.",
                "Berlin is the capital of Germany."
            ]
        );
    }
}

#[tokio::test]
async fn test_query_never_exceeds_corpus() {
    let handle = EmbedderHandle::spawn(Arc::new(HashingEmbedder::default())).unwrap();
    let cache = EmbeddingCache::new(handle, CacheConfig::default());
    cache.populate(capitals()).await;

    assert_eq!(cache.query(QUESTION, 5).await.unwrap().len(), 2);
}
