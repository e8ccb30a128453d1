//! Offline ingestion: read the corpus, split it into passages, embed them and
//! upsert the vectors.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunker::Chunker;
use crate::embedder::Embedder;
use crate::embeddings::EmbeddedPassage;
use crate::pinecone::{IndexDescription, PineconeClient, ServerlessSpec};
use crate::vector_store::{IndexName, VectorIndex};

/// What to do with an index that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum IndexMode {
    /// Create the index when missing; otherwise reuse it after checking its dimension.
    #[default]
    Ensure,
    /// Delete any existing index and create it fresh.
    Recreate,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Passages produced by the chunker.
    pub passages: usize,
    /// Vectors acknowledged by the index.
    pub upserted: usize,
    /// Embedding batches sent.
    pub batches: usize,
    /// Wall-clock time spent.
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(value.as_millis())
    }
}

/// Reads a UTF-8 corpus, failing on a missing or blank file.
pub fn read_corpus(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    if text.trim().is_empty() {
        bail!("input file {} is empty", path.display());
    }
    Ok(text)
}

/// Label stored with each passage: the lowercased file stem with anything
/// outside `[a-z0-9]` replaced by `-`.
pub fn source_label(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let label: String = stem
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect();
    let label = label.trim_matches('-');
    if label.is_empty() {
        "corpus".to_string()
    } else {
        label.to_string()
    }
}

/// Chunks, embeds and upserts `text`.
///
/// Passages are embedded in batches of [`Embedder::batch_size`] and each
/// batch is upserted as soon as it is embedded. Every vector must have
/// `dimension` values.
pub fn ingest_text(
    source: &str,
    text: &str,
    chunker: &Chunker,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    dimension: usize,
) -> Result<IngestReport> {
    let started = Instant::now();
    let passages = chunker.split(source, text);
    if passages.is_empty() {
        bail!("no passages produced from {source}");
    }
    info!(
        source,
        passages = passages.len(),
        batch_size = embedder.batch_size(),
        "embedding passages"
    );
    let mut upserted = 0usize;
    let mut batches = 0usize;
    for batch in passages.chunks(embedder.batch_size().max(1)) {
        let inputs: Vec<&str> = batch.iter().map(|p| p.text.as_str()).collect();
        let vectors = embedder
            .embed_batch(&inputs)
            .with_context(|| format!("failed to embed batch {}", batches + 1))?;
        if vectors.len() != batch.len() {
            bail!(
                "embedding batch {} returned {} vectors for {} passages",
                batches + 1,
                vectors.len(),
                batch.len()
            );
        }
        let mut records = Vec::with_capacity(batch.len());
        for (passage, embedding) in batch.iter().zip(vectors) {
            if embedding.len() != dimension {
                bail!(
                    "embedding for passage '{}' has {} dimensions; expected {}",
                    passage.id,
                    embedding.len(),
                    dimension
                );
            }
            records.push(EmbeddedPassage {
                passage: passage.clone(),
                embedding,
            });
        }
        upserted += index
            .upsert(&records)
            .with_context(|| format!("failed to upsert batch {}", batches + 1))?;
        batches += 1;
        debug!(batch = batches, upserted, "batch stored");
    }
    let report = IngestReport {
        passages: passages.len(),
        upserted,
        batches,
        elapsed: started.elapsed(),
    };
    info!(
        passages = report.passages,
        upserted = report.upserted,
        batches = report.batches,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "ingestion finished"
    );
    Ok(report)
}

/// Makes sure a ready index with `dimension` exists according to `mode`.
pub fn prepare_index(
    client: &PineconeClient,
    name: &IndexName,
    dimension: usize,
    spec: &ServerlessSpec,
    mode: IndexMode,
    ready_timeout: Duration,
) -> Result<IndexDescription> {
    let existing = client.describe_index(name)?;
    match (mode, existing) {
        (IndexMode::Ensure, Some(description)) => {
            if description.dimension != dimension {
                bail!(
                    "index '{}' has dimension {} but EMBEDDING_DIM is {}; rerun with --index-mode recreate",
                    name,
                    description.dimension,
                    dimension
                );
            }
            info!(index = %name, dimension, "reusing existing index");
            if description.status.ready {
                return Ok(description);
            }
        }
        (IndexMode::Recreate, Some(_)) => {
            warn!(index = %name, "recreating index; existing vectors will be lost");
            client.delete_index(name)?;
            client.wait_until_deleted(name, ready_timeout)?;
            client.create_index(name, dimension, spec)?;
        }
        (_, None) => {
            client.create_index(name, dimension, spec)?;
        }
    }
    client.wait_until_ready(name, ready_timeout)
}
