//! Exact cosine similarity search by linear scan.

use std::collections::HashMap;

use super::{cosine_similarity, rank, AnnIndex, IndexError, SearchResult};
use crate::ids::NodeId;

/// Reference index: every search scans every stored vector.
pub struct BruteForceIndex {
    /// Node ID -> embedding
    entries: HashMap<NodeId, Vec<f32>>,
    /// Expected embedding dimensions
    dimensions: usize,
}

impl BruteForceIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<&Vec<f32>> {
        self.entries.get(id)
    }
}

impl AnnIndex for BruteForceIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, id: &NodeId) -> bool {
        self.entries.contains_key(id)
    }

    fn add(&mut self, id: NodeId, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        self.entries.insert(id, vector);
        Ok(())
    }

    fn remove(&mut self, id: &NodeId) -> bool {
        self.entries.remove(id).is_some()
    }

    fn search(&self, query: &[f32], k: usize, threshold: f32) -> Vec<SearchResult> {
        if query.len() != self.dimensions {
            log::warn!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            );
            return vec![];
        }

        let results = self
            .entries
            .iter()
            .filter_map(|(id, vector)| {
                let score = cosine_similarity(query, vector);
                if score >= threshold {
                    Some(SearchResult {
                        id: id.clone(),
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        rank(results, k)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
