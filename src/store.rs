//! The chunk store contract.
//!
//! Retrieval only needs two queries from the persistent store: exact
//! metadata lookup and nearest-neighbour search. Everything else about the
//! backend (indexes, on-disk format) stays behind this trait.

use crate::{chunk::Chunk, error::Result, resolver::StructuralKind};

/// A chunk returned by a vector query, with its cosine distance to the
/// query vector (`0.0` identical, `2.0` opposite).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Read (and import) access to persisted chunk records.
///
/// Implementations are called from tokio's blocking pool and shared across
/// requests, so every method takes `&self`.
pub trait ChunkStore: Send + Sync {
    /// All chunks whose `kind` label equals any of `values` exactly.
    ///
    /// Results follow insertion order and contain each chunk at most once.
    fn find_by_metadata(
        &self,
        kind: StructuralKind,
        values: &[String],
    ) -> Result<Vec<Chunk>>;

    /// The `k` chunks closest to `vector`, by ascending cosine distance.
    ///
    /// Ties are broken by insertion order.
    fn find_by_vector(&self, vector: &[f32], k: usize)
    -> Result<Vec<ScoredChunk>>;

    /// The fixed embedding dimension, once the first chunk is stored.
    fn dimension(&self) -> Result<Option<usize>>;

    /// Number of stored chunks.
    fn count(&self) -> Result<usize>;

    /// Insert or replace chunks by id, in one transaction.
    ///
    /// Returns how many records were new.
    fn upsert(&self, chunks: &[Chunk]) -> Result<usize>;
}

/// Cosine distance between two equal-length vectors.
///
/// A zero vector has no direction; its distance to anything is `1.0`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 1.0;
    }
    (1.0 - dot / denom).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_zero_distance() {
        let d = cosine_distance(&[0.3, 0.4], &[0.6, 0.8]);
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_opposite() {
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        let opposite = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((opposite - 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_neutral() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
