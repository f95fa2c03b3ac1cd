//! Deterministic hashed bag-of-words embedding.
//!
//! Every token is hashed to one of `dimensions` slots with a hashed sign
//! (the "hashing trick"). Title words and extracted keywords weigh more
//! than body words, term frequency is dampened logarithmically and the
//! result is L2-normalised. No model files, no network.

use std::collections::HashMap;

use super::keywords::{extract_keywords, is_stop_word};
use super::preprocess::words;
use super::{FeatureError, FeatureExtractor};

/// Model tag stored alongside hash embeddings
pub const HASH_MODEL_TAG: &str = "fallback";

const TITLE_WEIGHT: f32 = 2.0;
const KEYWORD_WEIGHT: f32 = 1.5;
const TEXT_WEIGHT: f32 = 1.0;

/// Body tokens past this point don't contribute
const MAX_TEXT_TOKENS: usize = 2000;

/// Seed for the sign hash, distinct from the slot hash
const SIGN_SEED: u32 = 0x9e37_79b9;

pub struct HashFeatureExtractor {
    dimensions: usize,
    max_keywords: usize,
}

impl HashFeatureExtractor {
    pub fn new(dimensions: usize, max_keywords: usize) -> Self {
        Self {
            dimensions,
            max_keywords,
        }
    }

    fn slot(&self, token: &str) -> (usize, f32) {
        let index = crc32fast::hash(token.as_bytes()) as usize % self.dimensions;

        let mut sign_hasher = crc32fast::Hasher::new_with_initial(SIGN_SEED);
        sign_hasher.update(token.as_bytes());
        let sign = if sign_hasher.finalize() & 1 == 0 { 1.0 } else { -1.0 };

        (index, sign)
    }

    fn accumulate(weights: &mut HashMap<String, f32>, token: String, weight: f32) {
        if token.is_empty() || is_stop_word(&token) {
            return;
        }
        *weights.entry(token).or_insert(0.0) += weight;
    }
}

impl FeatureExtractor for HashFeatureExtractor {
    fn model_tag(&self) -> &str {
        HASH_MODEL_TAG
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn keywords(&self, title: &str, text: &str) -> Vec<String> {
        extract_keywords(title, text, self.max_keywords)
    }

    fn embed(
        &self,
        title: &str,
        text: &str,
        keywords: &[String],
    ) -> Result<Vec<f32>, FeatureError> {
        if self.dimensions == 0 {
            return Err(FeatureError::InvalidDimensions);
        }

        let mut weights: HashMap<String, f32> = HashMap::new();

        for word in words(title) {
            Self::accumulate(&mut weights, word, TITLE_WEIGHT);
        }
        for keyword in keywords {
            Self::accumulate(&mut weights, keyword.to_lowercase(), KEYWORD_WEIGHT);
        }
        for word in words(text).take(MAX_TEXT_TOKENS) {
            Self::accumulate(&mut weights, word, TEXT_WEIGHT);
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for (token, weight) in &weights {
            let (index, sign) = self.slot(token);
            vector[index] += sign * (1.0 + weight).ln();
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in vector.iter_mut() {
                *value /= norm;
            }
        }

        Ok(vector)
    }
}
