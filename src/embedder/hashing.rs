//! Deterministic bag-of-words embedder that needs no network.
//!
//! Useful for tests and offline experiments: texts that share content words
//! land close together, texts that share none are orthogonal.

use anyhow::Result;
use crc32fast::Hasher as Crc32;

use super::Embedder;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "as", "at", "be", "by", "did", "do", "does", "for",
    "from", "had", "has", "have", "he", "her", "his", "how", "in", "is", "it", "its", "me", "my",
    "of", "on", "or", "she", "tell", "that", "the", "their", "them", "they", "this", "to", "was",
    "were", "what", "when", "where", "which", "who", "why", "with", "you", "your",
];

/// Feature-hashing embedder over lowercase content words.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    batch_size: usize,
}

impl HashingEmbedder {
    /// Builds an embedder producing vectors of `dimensions` values.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            batch_size: 64,
        }
    }

    /// Overrides the maximum batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in content_words(text) {
            let mut hasher = Crc32::new();
            hasher.update(token.as_bytes());
            let bucket = hasher.finalize() as usize % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        anyhow::ensure!(
            inputs.len() <= self.batch_size,
            "batch of {} exceeds configured max {}",
            inputs.len(),
            self.batch_size
        );
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

fn content_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|tok| tok.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|tok| !STOPWORDS.contains(&tok.as_str()))
}
