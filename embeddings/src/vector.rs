//! Vector math for embeddings: mean pooling and cosine similarity.
//!
//! Every primitive comes in more than one strategy. The strategies are
//! interchangeable and agree within floating point tolerance; the enums
//! below let callers pick one at runtime.

use serde::{Deserialize, Serialize};

/// Distance assigned to a candidate whose similarity is undefined.
pub const MAX_DISTANCE: f64 = f64::INFINITY;

/// Lane width for the vectorized kernels.
const LANES: usize = 4;

/// How token vectors are reduced to a single vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolingStrategy {
    /// Accumulate into a zeroed buffer, then divide.
    #[default]
    Scalar,
    /// Accumulate lane-wise starting from the first vector, then scale.
    Vectorized,
}

impl PoolingStrategy {
    /// Mean-pool `vectors` with this strategy.
    ///
    /// # Panics
    ///
    /// Panics if the vectors do not all share one dimension.
    pub fn mean_pool<V: AsRef<[f64]>>(self, vectors: &[V]) -> Option<Vec<f64>> {
        match self {
            Self::Scalar => mean_pool_scalar(vectors),
            Self::Vectorized => mean_pool_vectorized(vectors),
        }
    }
}

/// How cosine similarity is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityStrategy {
    /// Single indexed loop.
    #[default]
    Loop,
    /// Iterator map/sum composition.
    Iterator,
    /// Lane-wise dot product and sums of squares.
    Simd,
}

impl SimilarityStrategy {
    /// Cosine similarity of `a` and `b` with this strategy.
    pub fn similarity(self, a: &[f64], b: &[f64]) -> Option<f64> {
        match self {
            Self::Loop => cosine_similarity_loop(a, b),
            Self::Iterator => cosine_similarity_iter(a, b),
            Self::Simd => cosine_similarity_simd(a, b),
        }
    }
}

/// Element-wise mean of `vectors`, accumulate-then-divide.
///
/// Returns `None` when there is nothing to average.
///
/// # Panics
///
/// Panics if the vectors do not all share one dimension.
pub fn mean_pool_scalar<V: AsRef<[f64]>>(vectors: &[V]) -> Option<Vec<f64>> {
    let dim = vectors.first()?.as_ref().len();
    let mut sum = vec![0.0f64; dim];

    for v in vectors {
        let v = v.as_ref();
        assert_eq!(v.len(), dim, "all vectors must have the same dimension");
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }

    let count = vectors.len() as f64;
    for acc in &mut sum {
        *acc /= count;
    }
    Some(sum)
}

/// Element-wise mean of `vectors`, lane-wise accumulate-then-scale.
///
/// Starts from a copy of the first vector so no zero fill is needed.
///
/// # Panics
///
/// Panics if the vectors do not all share one dimension.
pub fn mean_pool_vectorized<V: AsRef<[f64]>>(vectors: &[V]) -> Option<Vec<f64>> {
    let (first, rest) = vectors.split_first()?;
    let dim = first.as_ref().len();
    assert!(
        rest.iter().all(|v| v.as_ref().len() == dim),
        "all vectors must have the same dimension"
    );

    let mut acc = first.as_ref().to_vec();
    for v in rest {
        add_assign_lanes(&mut acc, v.as_ref());
    }

    scale_lanes(&mut acc, 1.0 / vectors.len() as f64);
    Some(acc)
}

fn add_assign_lanes(acc: &mut [f64], v: &[f64]) {
    let mut acc_chunks = acc.chunks_exact_mut(LANES);
    let mut v_chunks = v.chunks_exact(LANES);
    for (a, b) in (&mut acc_chunks).zip(&mut v_chunks) {
        a[0] += b[0];
        a[1] += b[1];
        a[2] += b[2];
        a[3] += b[3];
    }
    for (a, b) in acc_chunks.into_remainder().iter_mut().zip(v_chunks.remainder()) {
        *a += b;
    }
}

fn scale_lanes(acc: &mut [f64], factor: f64) {
    let mut chunks = acc.chunks_exact_mut(LANES);
    for a in &mut chunks {
        a[0] *= factor;
        a[1] *= factor;
        a[2] *= factor;
        a[3] *= factor;
    }
    for a in chunks.into_remainder() {
        *a *= factor;
    }
}

/// Cosine similarity computed in one explicit loop.
///
/// Returns `None` for mismatched or empty vectors and for a zero vector on
/// either side. The result lies in `[-1.0, 1.0]`.
pub fn cosine_similarity_loop(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0;
    let mut squared_a = 0.0;
    let mut squared_b = 0.0;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        squared_a += a[i] * a[i];
        squared_b += b[i] * b[i];
    }

    finish_cosine(dot, squared_a, squared_b)
}

/// Cosine similarity composed from iterator adapters.
pub fn cosine_similarity_iter(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let squared_a: f64 = a.iter().map(|x| x * x).sum();
    let squared_b: f64 = b.iter().map(|x| x * x).sum();

    finish_cosine(dot, squared_a, squared_b)
}

/// Cosine similarity from lane-wise dot product and sums of squares.
///
/// Keeps `LANES` independent accumulators so the compiler can map the
/// inner loop onto SIMD registers.
pub fn cosine_similarity_simd(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = [0.0f64; LANES];
    let mut squared_a = [0.0f64; LANES];
    let mut squared_b = [0.0f64; LANES];

    let a_chunks = a.chunks_exact(LANES);
    let b_chunks = b.chunks_exact(LANES);
    let (a_tail, b_tail) = (a_chunks.remainder(), b_chunks.remainder());

    for (x, y) in a_chunks.zip(b_chunks) {
        for lane in 0..LANES {
            dot[lane] += x[lane] * y[lane];
            squared_a[lane] += x[lane] * x[lane];
            squared_b[lane] += y[lane] * y[lane];
        }
    }

    let mut dot: f64 = dot.iter().sum();
    let mut squared_a: f64 = squared_a.iter().sum();
    let mut squared_b: f64 = squared_b.iter().sum();
    for (x, y) in a_tail.iter().zip(b_tail) {
        dot += x * y;
        squared_a += x * x;
        squared_b += y * y;
    }

    finish_cosine(dot, squared_a, squared_b)
}

fn finish_cosine(dot: f64, squared_a: f64, squared_b: f64) -> Option<f64> {
    let norm_a = squared_a.sqrt();
    let norm_b = squared_b.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Cosine distance (`1 - similarity`); smaller is closer.
///
/// `None` when the similarity is undefined. Rankers map that to
/// [`MAX_DISTANCE`].
pub fn cosine_distance(a: &[f64], b: &[f64], strategy: SimilarityStrategy) -> Option<f64> {
    strategy.similarity(a, b).map(|similarity| 1.0 - similarity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const ALL_SIMILARITY: [SimilarityStrategy; 3] = [
        SimilarityStrategy::Loop,
        SimilarityStrategy::Iterator,
        SimilarityStrategy::Simd,
    ];

    fn random_vectors(rng: &mut StdRng, count: usize, dim: usize) -> Vec<Vec<f64>> {
        (0..count)
            .map(|_| (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect()
    }

    fn relative_error(a: f64, b: f64) -> f64 {
        let scale = a.abs().max(b.abs());
        if scale == 0.0 { 0.0 } else { (a - b).abs() / scale }
    }

    #[test]
    fn test_mean_pool_strategies_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        for (count, dim) in [(1, 1), (2, 3), (5, 4), (17, 9), (64, 512)] {
            let vectors = random_vectors(&mut rng, count, dim);
            let scalar = mean_pool_scalar(&vectors).unwrap();
            let vectorized = mean_pool_vectorized(&vectors).unwrap();
            assert_eq!(scalar.len(), dim);
            for (s, v) in scalar.iter().zip(&vectorized) {
                assert!(relative_error(*s, *v) < 1e-9, "{s} vs {v}");
            }
        }
    }

    #[test]
    fn test_mean_pool_values() {
        let vectors = vec![vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![3.0, 4.0, 5.0, 6.0, 7.0]];
        assert_eq!(
            mean_pool_scalar(&vectors),
            Some(vec![2.0, 3.0, 4.0, 5.0, 6.0])
        );
        assert_eq!(
            PoolingStrategy::Vectorized.mean_pool(&vectors),
            Some(vec![2.0, 3.0, 4.0, 5.0, 6.0])
        );
    }

    #[test]
    fn test_mean_pool_empty_is_none() {
        let empty: Vec<Vec<f64>> = Vec::new();
        assert_eq!(mean_pool_scalar(&empty), None);
        assert_eq!(mean_pool_vectorized(&empty), None);
    }

    #[test]
    fn test_mean_pool_keeps_zero_vector() {
        let zeros = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        assert_eq!(mean_pool_scalar(&zeros), Some(vec![0.0, 0.0]));
    }

    #[test]
    #[should_panic(expected = "same dimension")]
    fn test_mean_pool_scalar_dimension_mismatch_panics() {
        mean_pool_scalar(&[vec![1.0, 2.0], vec![1.0]]);
    }

    #[test]
    #[should_panic(expected = "same dimension")]
    fn test_mean_pool_vectorized_dimension_mismatch_panics() {
        mean_pool_vectorized(&[vec![1.0, 2.0], vec![1.0]]);
    }

    #[test]
    fn test_cosine_strategies_agree() {
        let mut rng = StdRng::seed_from_u64(42);
        for dim in [1, 3, 4, 7, 128, 513] {
            for _ in 0..20 {
                let pair = random_vectors(&mut rng, 2, dim);
                let reference = cosine_similarity_loop(&pair[0], &pair[1]).unwrap();
                assert!((-1.0..=1.0).contains(&reference));
                for strategy in ALL_SIMILARITY {
                    let value = strategy.similarity(&pair[0], &pair[1]).unwrap();
                    assert!((-1.0..=1.0).contains(&value));
                    assert!((value - reference).abs() < 1e-9, "{strategy:?}: {value} vs {reference}");
                }
            }
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![0.3, 0.1, 0.9];
        for strategy in ALL_SIMILARITY {
            let sim = strategy.similarity(&a, &a).unwrap();
            assert!((sim - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        for strategy in ALL_SIMILARITY {
            assert!(strategy.similarity(&a, &b).unwrap().abs() < 1e-12);
        }
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let b: Vec<f64> = a.iter().map(|x| -x).collect();
        for strategy in ALL_SIMILARITY {
            let sim = strategy.similarity(&a, &b).unwrap();
            assert!((sim + 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cosine_similarity_undefined_cases() {
        for strategy in ALL_SIMILARITY {
            assert_eq!(strategy.similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), None);
            assert_eq!(strategy.similarity(&[], &[]), None);
            assert_eq!(strategy.similarity(&[0.0, 0.0], &[1.0, 2.0]), None);
            assert_eq!(strategy.similarity(&[1.0, 2.0], &[0.0, 0.0]), None);
        }
    }

    #[test]
    fn test_cosine_distance() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert_eq!(cosine_distance(&a, &a, SimilarityStrategy::Loop), Some(0.0));
        let d = cosine_distance(&a, &b, SimilarityStrategy::Simd).unwrap();
        assert!((d - 1.0).abs() < 1e-12);
        assert_eq!(cosine_distance(&a, &[0.0, 0.0], SimilarityStrategy::Iterator), None);
    }

    #[test]
    fn test_strategies_deserialize_snake_case() {
        let pooling: PoolingStrategy = serde_json::from_str("\"vectorized\"").unwrap();
        let similarity: SimilarityStrategy = serde_json::from_str("\"simd\"").unwrap();
        assert_eq!(pooling, PoolingStrategy::Vectorized);
        assert_eq!(similarity, SimilarityStrategy::Simd);
    }
}
