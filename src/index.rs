//! The precomputed document index.
//!
//! Loaded once at startup from a JSON file and shared read-only (behind an
//! `Arc`) by every session. Search is brute-force cosine similarity over all
//! chunk embeddings, which is fine for the few thousand chunks a single
//! document collection produces.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::embedding::cosine_similarity;
use crate::models::RetrievedChunk;

/// On-disk representation of the index.
#[derive(Debug, Deserialize)]
struct IndexFile {
    #[serde(default)]
    embedding_model: Option<String>,
    chunks: Vec<IndexedChunk>,
}

/// A chunk of source text with its precomputed embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug)]
pub struct DocumentIndex {
    chunks: Vec<IndexedChunk>,
    embedding_model: Option<String>,
    dims: usize,
    fingerprint: String,
}

impl DocumentIndex {
    /// Read and validate an index file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read document index: {}", path.display()))?;

        let fingerprint = hex::encode(Sha256::digest(&bytes));

        let file: IndexFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse document index: {}", path.display()))?;

        let index = Self::from_chunks(file.chunks, file.embedding_model, fingerprint)?;

        tracing::info!(
            path = %path.display(),
            chunks = index.len(),
            dims = index.dims(),
            fingerprint = %index.short_fingerprint(),
            "loaded document index"
        );

        Ok(index)
    }

    /// Build an index from in-memory chunks. All embeddings must share one
    /// non-zero dimensionality.
    pub fn from_chunks(
        chunks: Vec<IndexedChunk>,
        embedding_model: Option<String>,
        fingerprint: String,
    ) -> Result<Self> {
        let first = match chunks.first() {
            Some(c) => c,
            None => bail!("document index contains no chunks"),
        };

        let dims = first.embedding.len();
        if dims == 0 {
            bail!("chunk '{}' has an empty embedding", first.id);
        }

        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dims) {
            bail!(
                "chunk '{}' has {} dimensions, expected {}",
                bad.id,
                bad.embedding.len(),
                dims
            );
        }

        Ok(Self {
            chunks,
            embedding_model,
            dims,
            fingerprint,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    /// Hex SHA-256 of the index file.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..self.fingerprint.len().min(12)]
    }

    /// Chunk count per source, sorted by source name.
    pub fn source_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for c in &self.chunks {
            *counts.entry(c.source.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Log a warning when the index was built with a different embedding
    /// model than the one queries will use.
    pub fn check_embedding_model(&self, query_model: &str) {
        if let Some(model) = self.embedding_model() {
            if model != query_model {
                tracing::warn!(
                    index_model = model,
                    query_model,
                    "document index was embedded with a different model than configured"
                );
            }
        }
    }

    /// Return the `k` chunks most similar to `query`, best first. Equal
    /// scores keep index order.
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if query.len() != self.dims {
            bail!(
                "query embedding has {} dimensions, index has {}",
                query.len(),
                self.dims
            );
        }

        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, &c.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let c = &self.chunks[i];
                RetrievedChunk {
                    id: c.id.clone(),
                    source: c.source.clone(),
                    title: c.title.clone(),
                    text: c.text.clone(),
                    score,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn chunk(id: &str, source: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            source: source.to_string(),
            title: None,
            text: format!("text of {}", id),
            embedding,
        }
    }

    #[test]
    fn test_similarity_search_orders_by_score() {
        let index = DocumentIndex::from_chunks(
            vec![
                chunk("a", "s1", vec![1.0, 0.0]),
                chunk("b", "s1", vec![0.0, 1.0]),
                chunk("c", "s2", vec![0.7, 0.7]),
            ],
            None,
            "f".repeat(64),
        )
        .unwrap();

        let hits = index.similarity_search(&[0.0, 1.0], 2).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_similarity_search_ties_keep_index_order() {
        let index = DocumentIndex::from_chunks(
            vec![
                chunk("first", "s", vec![1.0, 0.0]),
                chunk("second", "s", vec![2.0, 0.0]),
            ],
            None,
            String::new(),
        )
        .unwrap();

        let hits = index.similarity_search(&[1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "first");
    }

    #[test]
    fn test_dimension_mismatch_in_query() {
        let index =
            DocumentIndex::from_chunks(vec![chunk("a", "s", vec![1.0, 0.0])], None, String::new())
                .unwrap();
        assert!(index.similarity_search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_rejects_empty_and_ragged_indexes() {
        assert!(DocumentIndex::from_chunks(vec![], None, String::new()).is_err());
        assert!(DocumentIndex::from_chunks(
            vec![chunk("a", "s", vec![1.0]), chunk("b", "s", vec![1.0, 2.0])],
            None,
            String::new()
        )
        .is_err());
        assert!(
            DocumentIndex::from_chunks(vec![chunk("a", "s", vec![])], None, String::new())
                .is_err()
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::json!({
            "embedding_model": "text-embedding-ada-002",
            "chunks": [
                { "id": "a#0", "source": "b.html", "text": "alpha", "embedding": [1.0, 0.0] },
                { "id": "b#0", "source": "a.html", "title": "A", "text": "beta", "embedding": [0.0, 1.0] }
            ]
        });
        file.write_all(json.to_string().as_bytes()).unwrap();

        let index = DocumentIndex::load(file.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dims(), 2);
        assert_eq!(index.embedding_model(), Some("text-embedding-ada-002"));
        let counts: Vec<(&str, usize)> = index.source_counts().into_iter().collect();
        assert_eq!(counts, vec![("a.html", 1), ("b.html", 1)]);
        assert_eq!(index.fingerprint().len(), 64);
        assert_eq!(index.short_fingerprint().len(), 12);
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        let err = DocumentIndex::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse document index"));
    }
}
