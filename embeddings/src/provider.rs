//! Embedding providers.
//!
//! An [`Embedder`] turns text into token-level vectors. Providers that only
//! expose a whole-text vector return a single token spanning the input, in
//! which case pooling is the identity.

use std::ops::Range;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::{DEFAULT_DIMENSION, Embedding};

/// A vector for one token of the input, with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEmbedding {
    /// The token vector.
    pub vector: Embedding,

    /// Byte range of the token in the embedded text.
    pub span: Range<usize>,
}

impl AsRef<[f64]> for TokenEmbedding {
    fn as_ref(&self) -> &[f64] {
        &self.vector
    }
}

/// Trait for embedding models.
///
/// Implementations are not assumed to be reentrant. Callers go through
/// [`crate::EmbedderHandle`], which runs every request on one worker task.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Get the name of this embedder.
    fn name(&self) -> &str;

    /// Dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Whether the model can be used (weights present, API key set, etc.).
    fn is_available(&self) -> bool {
        true
    }

    /// Produce token vectors for `text`. Empty input yields no tokens.
    async fn embed(&self, text: &str) -> Result<Vec<TokenEmbedding>>;
}

/// Local deterministic embedder based on feature hashing.
///
/// Each alphanumeric token is lowercased and mapped to a one-hot vector whose
/// hot index is taken from the token's SHA-256. Mean pooling over the tokens
/// then gives a term-frequency vector, which is enough to rank texts
/// by shared vocabulary without any model weights.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create a hashing embedder with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.to_lowercase().as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(prefix) % self.dimension as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_available(&self) -> bool {
        self.dimension > 0
    }

    async fn embed(&self, text: &str) -> Result<Vec<TokenEmbedding>> {
        if self.dimension == 0 {
            return Err(EmbeddingError::ModelUnavailable(
                "hashing embedder has zero dimension".to_string(),
            ));
        }

        let tokens = token_spans(text)
            .into_iter()
            .map(|span| {
                let mut vector = vec![0.0; self.dimension];
                vector[self.bucket(&text[span.clone()])] = 1.0;
                TokenEmbedding { vector, span }
            })
            .collect();
        Ok(tokens)
    }
}

/// Byte spans of the alphanumeric runs in `text`.
fn token_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            spans.push(s..i);
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }
    spans
}

/// OpenAI-compatible HTTP embedder.
///
/// Returns one whole-text vector per request.
pub struct OpenAiEmbedder {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Model name.
    model: String,

    /// Requested output dimensions, if the model supports shortening.
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    /// Create a new OpenAI embedder, reading `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self::from_env("OPENAI_API_KEY")
    }

    /// Create a new OpenAI embedder with the API key read from `var`.
    pub fn from_env(var: &str) -> Self {
        Self {
            api_key: std::env::var(var).ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request shortened output vectors.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

impl Default for OpenAiEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        if let Some(dimensions) = self.dimensions {
            return dimensions;
        }
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn embed(&self, text: &str) -> Result<Vec<TokenEmbedding>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self.api_key.as_ref().ok_or_else(|| {
            EmbeddingError::ModelUnavailable("OPENAI_API_KEY is not set".to_string())
        })?;

        debug!("Generating embedding with model: {}", self.model);

        let mut body = serde_json::json!({
            "input": text,
            "model": self.model
        });
        if let Some(dims) = self.dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error: {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response.json().await?;

        let vector = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))?
            .embedding;

        info!("Generated embedding with {} dimensions", vector.len());

        Ok(vec![TokenEmbedding {
            vector,
            span: 0..text.len(),
        }])
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f64>,
}
