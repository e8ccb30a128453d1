//! Passage records shared by ingestion, the vector index and the answer engine.

use serde::{Deserialize, Serialize};

/// Contiguous span of the source corpus. Immutable once produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Deterministic identifier derived from the source label and byte offset.
    pub id: String,
    /// Label of the ingested file (its sanitized stem).
    pub source: String,
    /// Position of the passage within its source.
    pub chunk_index: usize,
    /// Passage body submitted to the embedding model.
    pub text: String,
    /// Byte offset of the first character in the source.
    pub byte_start: usize,
    /// Byte offset one past the last character in the source.
    pub byte_end: usize,
    /// Rough whitespace token count.
    pub token_estimate: usize,
    /// CRC32 of `text`.
    pub checksum: u32,
}

/// Builds the identifier stored in the vector index for a passage.
pub fn passage_id(source: &str, byte_start: usize) -> String {
    format!("{source}-{byte_start}")
}

/// Passage plus its embedding, ready to upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedPassage {
    /// Source passage.
    pub passage: Passage,
    /// Model embedding vector.
    pub embedding: Vec<f32>,
}

/// Passage returned from a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPassage {
    /// Identifier stored in the index.
    pub id: String,
    /// Similarity reported by the index (cosine; higher is closer).
    pub score: f32,
    /// Passage text from the stored metadata.
    pub text: String,
    /// Source label from the stored metadata, when present.
    #[serde(default)]
    pub source: Option<String>,
    /// Chunk position from the stored metadata, when present.
    #[serde(default)]
    pub chunk_index: Option<usize>,
}
