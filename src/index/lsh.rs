//! Random-hyperplane LSH index.
//!
//! Each vector gets a `num_hashes`-bit code: bit i is set iff the dot product
//! with hyperplane i is positive. Vectors are bucketed by their full code.
//! A search probes the query's bucket plus every bucket one bit-flip away,
//! tops the candidate set up with arbitrary vectors when it is too small,
//! then re-scores candidates with exact cosine similarity.

use std::collections::{HashMap, HashSet};

use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{cosine_similarity, rank, AnnIndex, IndexError, SearchResult};
use crate::ids::NodeId;

pub struct LshIndex {
    dimensions: usize,
    /// One random hyperplane per hash bit
    hyperplanes: Vec<Vec<f32>>,
    /// Arbitrary vectors scanned when buckets yield fewer than k candidates
    fallback_scan: usize,

    vectors: HashMap<NodeId, Vec<f32>>,
    codes: HashMap<NodeId, u32>,
    buckets: HashMap<u32, HashSet<NodeId>>,
}

impl LshIndex {
    /// `num_hashes` is capped at 32 bits.
    pub fn new(dimensions: usize, num_hashes: usize, fallback_scan: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let hyperplanes = (0..num_hashes.min(32))
            .map(|_| {
                (0..dimensions)
                    .map(|_| rng.random_range(-1.0f32..1.0))
                    .collect()
            })
            .collect();

        Self {
            dimensions,
            hyperplanes,
            fallback_scan,
            vectors: HashMap::new(),
            codes: HashMap::new(),
            buckets: HashMap::new(),
        }
    }

    pub fn num_hashes(&self) -> usize {
        self.hyperplanes.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn hash(&self, vector: &[f32]) -> u32 {
        self.hyperplanes
            .iter()
            .enumerate()
            .fold(0u32, |code, (bit, plane)| {
                let dot: f32 = plane.iter().zip(vector.iter()).map(|(p, v)| p * v).sum();
                if dot > 0.0 {
                    code | (1 << bit)
                } else {
                    code
                }
            })
    }

    fn detach(&mut self, id: &NodeId) {
        if let Some(code) = self.codes.remove(id) {
            if let Some(bucket) = self.buckets.get_mut(&code) {
                bucket.remove(id);
                if bucket.is_empty() {
                    self.buckets.remove(&code);
                }
            }
        }
    }

    fn candidates(&self, code: u32, k: usize) -> HashSet<&NodeId> {
        let mut candidates: HashSet<&NodeId> = HashSet::new();

        let probes = std::iter::once(code)
            .chain((0..self.num_hashes()).map(|bit| code ^ (1 << bit)));
        for probe in probes {
            if let Some(bucket) = self.buckets.get(&probe) {
                candidates.extend(bucket.iter());
            }
        }

        if candidates.len() < k {
            candidates.extend(self.vectors.keys().take(self.fallback_scan));
        }

        candidates
    }
}

impl AnnIndex for LshIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn contains(&self, id: &NodeId) -> bool {
        self.vectors.contains_key(id)
    }

    fn add(&mut self, id: NodeId, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        self.detach(&id);

        let code = self.hash(&vector);
        self.buckets.entry(code).or_default().insert(id.clone());
        self.codes.insert(id.clone(), code);
        self.vectors.insert(id, vector);

        Ok(())
    }

    fn remove(&mut self, id: &NodeId) -> bool {
        self.detach(id);
        self.vectors.remove(id).is_some()
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

        let code = self.hash(query);
        let results = self
            .candidates(code, k)
            .into_iter()
            .filter_map(|id| {
                let vector = self.vectors.get(id)?;
                let score = cosine_similarity(query, vector);
                (score >= threshold).then(|| SearchResult {
                    id: id.clone(),
                    score,
                })
            })
            .collect();

        rank(results, k)
    }

    fn clear(&mut self) {
        self.vectors.clear();
        self.codes.clear();
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_vectors::random_unit_vectors;
    use crate::index::BruteForceIndex;

    fn id(i: usize) -> NodeId {
        NodeId::from(format!("node-{i:03}"))
    }

    #[test]
    fn test_hash_is_stable_per_seed() {
        let a = LshIndex::new(8, 16, 100, 42);
        let b = LshIndex::new(8, 16, 100, 42);
        let v = vec![0.1, -0.4, 0.3, 0.9, -0.2, 0.0, 0.5, -0.7];
        assert_eq!(a.hash(&v), b.hash(&v));
    }

    #[test]
    fn test_num_hashes_capped() {
        let index = LshIndex::new(4, 64, 100, 1);
        assert_eq!(index.num_hashes(), 32);
    }

    #[test]
    fn test_self_match_recall() {
        let vectors = random_unit_vectors(50, 384, 7);
        let mut index = LshIndex::new(384, 16, 100, 11);
        for (i, v) in vectors.iter().enumerate() {
            index.add(id(i), v.clone()).unwrap();
        }

        for (i, v) in vectors.iter().enumerate() {
            let results = index.search(v, 5, 0.0);
            assert_eq!(results[0].id, id(i), "vector {i} should match itself first");
            assert!((results[0].score - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_small_index_falls_back_to_scan() {
        // two far-apart vectors rarely share a bucket; k=2 must still see both
        let mut index = LshIndex::new(3, 16, 100, 5);
        index.add(id(1), vec![1.0, 0.0, 0.0]).unwrap();
        index.add(id(2), vec![-1.0, 0.2, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2, -1.0);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, id(1));
    }

    #[test]
    fn test_matches_brute_force_top_hit() {
        let vectors = random_unit_vectors(40, 64, 99);
        let mut lsh = LshIndex::new(64, 16, 100, 3);
        let mut brute = BruteForceIndex::new(64);
        for (i, v) in vectors.iter().enumerate() {
            lsh.add(id(i), v.clone()).unwrap();
            brute.add(id(i), v.clone()).unwrap();
        }

        // fewer than 100 vectors: the fallback scan covers everything
        let query = &vectors[17];
        let lsh_results = lsh.search(query, 10, 0.0);
        let brute_results = brute.search(query, 10, 0.0);
        assert_eq!(lsh_results, brute_results);
    }

    #[test]
    fn test_remove_evicts_from_bucket() {
        let mut index = LshIndex::new(3, 8, 100, 5);
        index.add(id(1), vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.bucket_count(), 1);

        assert!(index.remove(&id(1)));
        assert!(!index.contains(&id(1)));
        assert_eq!(index.bucket_count(), 0);
        assert!(index.search(&[1.0, 0.0, 0.0], 10, -1.0).is_empty());

        // no-op when absent
        assert!(!index.remove(&id(1)));
    }

    #[test]
    fn test_re_add_moves_bucket() {
        let mut index = LshIndex::new(3, 8, 0, 5);
        index.add(id(1), vec![1.0, 0.0, 0.0]).unwrap();
        index.add(id(1), vec![-1.0, 0.0, 0.0]).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.bucket_count(), 1);
        let results = index.search(&[-1.0, 0.0, 0.0], 1, 0.5);
        assert_eq!(results[0].id, id(1));
    }

    #[test]
    fn test_clear() {
        let mut index = LshIndex::new(3, 8, 100, 5);
        index.add(id(1), vec![1.0, 0.0, 0.0]).unwrap();
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.bucket_count(), 0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = LshIndex::new(3, 8, 100, 5);
        assert!(matches!(
            index.add(id(1), vec![1.0]),
            Err(IndexError::DimensionMismatch { expected: 3, got: 1 })
        ));
        assert!(index.search(&[1.0], 1, 0.0).is_empty());
    }
}
