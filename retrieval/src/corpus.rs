//! Loading chunk corpora from JSON bundles.
//!
//! A bundle is a JSON array of records with `chunk_file`, `original_url`,
//! `title` and `content` keys.

use std::path::Path;

use semindex_embeddings::Chunk;
use tracing::info;

use crate::error::{Result, RetrievalError};

/// Read every chunk from the bundle at `path`.
///
/// Decoding errors carry the file path and the position of the problem.
pub fn load_chunks(path: impl AsRef<Path>) -> Result<Vec<Chunk>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| RetrievalError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let chunks = parse_chunks(path, &content)?;
    info!("Loaded {} chunks from {}", chunks.len(), path.display());
    Ok(chunks)
}

fn parse_chunks(path: &Path, content: &str) -> Result<Vec<Chunk>> {
    serde_json::from_str(content).map_err(|source| RetrievalError::Corpus {
        path: path.to_path_buf(),
        line: source.line(),
        column: source.column(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_load_bundle() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"chunk_file": "a_001.txt", "original_url": "https://example.com/a", "title": "A", "content": "first"}},
                {{"chunk_file": "a_002.txt", "original_url": "https://example.com/a", "title": "A", "content": "second"}}
            ]"#
        )
        .unwrap();

        let chunks = load_chunks(file.path()).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], Chunk::new("a_002.txt", "https://example.com/a", "A", "second"));
    }

    #[test]
    fn test_missing_key_reports_position() {
        let json = "[\n  {\"chunk_file\": \"a.txt\", \"title\": \"A\", \"content\": \"x\"}\n]";
        let err = parse_chunks(Path::new("bundle.json"), json).unwrap_err();
        match &err {
            RetrievalError::Corpus { line, .. } => assert_eq!(*line, 2),
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("bundle.json"));
        assert!(message.contains("original_url"));
    }

    #[test]
    fn test_empty_bundle() {
        assert!(parse_chunks(Path::new("empty.json"), "[]").unwrap().is_empty());
    }
}
