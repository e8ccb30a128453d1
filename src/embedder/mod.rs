//! Text embedding clients.

use anyhow::{anyhow, Result};

pub mod hashing;
pub mod openai;

/// Anything that turns text into fixed-length vectors.
///
/// Implementations are blocking; async callers go through `spawn_blocking`.
pub trait Embedder: Send + Sync {
    /// Embeds at most [`Embedder::batch_size`] inputs in one call, preserving order.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Largest batch accepted by [`Embedder::embed_batch`].
    fn batch_size(&self) -> usize;

    /// Embeds a single input.
    fn embed_one(&self, input: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[input])?
            .pop()
            .ok_or_else(|| anyhow!("embedding service returned no vector"))
    }

    /// Embeds any number of inputs by splitting them into batches.
    fn embed_all(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size().max(1)) {
            out.extend(self.embed_batch(batch)?);
        }
        Ok(out)
    }
}
