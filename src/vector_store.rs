//! Vector index abstraction plus the helpers shared by its implementations.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::embeddings::{EmbeddedPassage, ScoredPassage};

/// Nearest-neighbour store holding passage embeddings.
///
/// Upserts are keyed by passage id, so writing the same passage twice
/// replaces it rather than adding a second copy.
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces the given passages. Returns how many were written.
    fn upsert(&self, records: &[EmbeddedPassage]) -> Result<usize>;

    /// Returns up to `top_k` passages ordered by descending similarity.
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>>;

    /// Number of vectors currently stored.
    fn vector_count(&self) -> Result<usize>;
}

/// Validated vector index name.
///
/// Lowercase ASCII letters, digits and `-`, starting and ending with an
/// alphanumeric character, at most 45 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexName(String);

impl IndexName {
    /// Longest name the hosted service accepts.
    pub const MAX_LEN: usize = 45;

    /// Validates and wraps an index name.
    pub fn new<S: Into<String>>(name: S) -> Result<Self> {
        let name = name.into();
        let name = name.trim();
        anyhow::ensure!(!name.is_empty(), "index name is required");
        anyhow::ensure!(
            name.len() <= Self::MAX_LEN,
            "index name '{}' is longer than {} characters",
            name,
            Self::MAX_LEN
        );
        anyhow::ensure!(
            name.chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-'),
            "index name '{}' may only contain lowercase letters, digits and '-'",
            name
        );
        anyhow::ensure!(
            !name.starts_with('-') && !name.ends_with('-'),
            "index name '{}' must start and end with a letter or digit",
            name
        );
        Ok(Self(name.to_string()))
    }

    /// Raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IndexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cosine similarity in `[-1, 1]`; zero when either vector has no magnitude
/// or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Exhaustive cosine index kept in process memory.
///
/// Stands in for the hosted index in tests and local experiments.
pub struct InMemoryIndex {
    dimension: usize,
    records: Mutex<BTreeMap<String, EmbeddedPassage>>,
}

impl InMemoryIndex {
    /// Creates an empty index accepting vectors of `dimension` values.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Mutex::new(BTreeMap::new()),
        }
    }
}

impl VectorIndex for InMemoryIndex {
    fn upsert(&self, records: &[EmbeddedPassage]) -> Result<usize> {
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != self.dimension) {
            anyhow::bail!(
                "vector for '{}' has {} dimensions; index expects {}",
                bad.passage.id,
                bad.embedding.len(),
                self.dimension
            );
        }
        let mut guard = self
            .records
            .lock()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        for record in records {
            guard.insert(record.passage.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>> {
        anyhow::ensure!(
            vector.len() == self.dimension,
            "query vector has {} dimensions; index expects {}",
            vector.len(),
            self.dimension
        );
        let guard = self
            .records
            .lock()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        let mut scored: Vec<ScoredPassage> = guard
            .values()
            .map(|record| ScoredPassage {
                id: record.passage.id.clone(),
                score: cosine_similarity(vector, &record.embedding),
                text: record.passage.text.clone(),
                source: Some(record.passage.source.clone()),
                chunk_index: Some(record.passage.chunk_index),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    fn vector_count(&self) -> Result<usize> {
        let guard = self
            .records
            .lock()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        Ok(guard.len())
    }
}
