//! In-memory vector indexes over page embeddings.
//!
//! - `lsh`: random-hyperplane locality sensitive hashing (default)
//! - `brute`: exact linear scan, the reference for correctness tests
//!
//! Both are derived caches: the store rebuilds them from durable embeddings.

mod brute;
mod lsh;

pub use brute::BruteForceIndex;
pub use lsh::LshIndex;

use crate::config::{IndexBackend, IndexConfig};
use crate::ids::NodeId;

/// Search result from a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: NodeId,
    /// Cosine similarity score (-1.0 to 1.0)
    pub score: f32,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub trait AnnIndex: Send + Sync {
    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: &NodeId) -> bool;

    /// Insert or replace the vector stored for `id`.
    fn add(&mut self, id: NodeId, vector: Vec<f32>) -> Result<(), IndexError>;

    /// Returns whether anything was removed.
    fn remove(&mut self, id: &NodeId) -> bool;

    /// Up to `k` entries with similarity >= `threshold`, best first.
    fn search(&self, query: &[f32], k: usize, threshold: f32) -> Vec<SearchResult>;

    fn clear(&mut self);
}

/// Build the index selected in config.
pub fn build_index(config: &IndexConfig) -> Box<dyn AnnIndex> {
    match config.backend {
        IndexBackend::Lsh => {
            let seed = config.seed.unwrap_or_else(rand::random::<u64>);
            Box::new(LshIndex::new(
                config.dimensions,
                config.num_hashes,
                config.fallback_scan,
                seed,
            ))
        }
        IndexBackend::Brute => Box::new(BruteForceIndex::new(config.dimensions)),
    }
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity between two vectors.
///
/// Zero when either vector has zero norm or when the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        log::warn!(
            "cosine similarity on mismatched dimensions ({} vs {})",
            a.len(),
            b.len()
        );
        return 0.0;
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Sort by score descending (ties by id) and keep the first `k`.
pub(crate) fn rank(mut results: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(k);
    results
}
