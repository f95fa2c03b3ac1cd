//! Text features for captured pages: keywords and a fixed-length embedding.
//!
//! # Architecture
//!
//! - `preprocess`: whitespace cleanup, truncation, content hashing
//! - `keywords`: frequency-ranked keyword extraction
//! - `hashing`: deterministic hashed embedding (no model download)
//!
//! Store, index and recall only see the `FeatureExtractor` trait, so a real
//! embedding backend can replace the hash extractor without touching them.

mod hashing;
pub mod keywords;
pub mod preprocess;

pub use hashing::{HashFeatureExtractor, HASH_MODEL_TAG};

/// Error type for feature extraction
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Embedding dimensions must be greater than zero")]
    InvalidDimensions,
}

/// Keywords and embedding derived from one page.
#[derive(Debug, Clone)]
pub struct PageFeatures {
    pub keywords: Vec<String>,
    pub embedding: Vec<f32>,
}

pub trait FeatureExtractor: Send + Sync {
    /// Tag recorded with every embedding this extractor produces
    fn model_tag(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn keywords(&self, title: &str, text: &str) -> Vec<String>;

    fn embed(&self, title: &str, text: &str, keywords: &[String]) -> Result<Vec<f32>, FeatureError>;

    fn extract(&self, title: &str, text: &str) -> Result<PageFeatures, FeatureError> {
        let keywords = self.keywords(title, text);
        let embedding = self.embed(title, text, &keywords)?;
        Ok(PageFeatures {
            keywords,
            embedding,
        })
    }

    /// Queries are embedded as a page whose title and text are the query.
    fn embed_query(&self, query: &str) -> Result<Vec<f32>, FeatureError> {
        self.embed(query, query, &[])
    }
}
