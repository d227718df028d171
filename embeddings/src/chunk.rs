//! Content-addressed text chunks.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Anything that exposes text content for ranking.
pub trait Embeddable {
    /// The text that gets embedded.
    fn content(&self) -> &str;
}

/// A unit of indexed text with provenance metadata.
///
/// The identity of a chunk is derived from its content alone, so two chunks
/// with the same text share one cache entry regardless of where they came
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// File the chunk was cut from.
    #[serde(rename = "chunk_file")]
    pub source_file: String,

    /// URL of the original document.
    pub original_url: String,

    /// Title of the original document.
    pub title: String,

    /// The chunk text.
    pub content: String,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(
        source_file: impl Into<String>,
        original_url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            original_url: original_url.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    /// Lowercase hex SHA-256 of the content bytes.
    pub fn id(&self) -> String {
        content_id(&self.content)
    }

    /// The first few characters of the content, for log lines.
    pub fn short_description(&self) -> String {
        let prefix: String = self.content.chars().take(20).collect();
        format!("'{prefix}...'")
    }
}

impl Embeddable for Chunk {
    fn content(&self) -> &str {
        &self.content
    }
}

impl Embeddable for String {
    fn content(&self) -> &str {
        self
    }
}

impl Embeddable for &str {
    fn content(&self) -> &str {
        self
    }
}

/// Content id for arbitrary text.
pub fn content_id(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
