use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ids::new_ulid;

const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_DATABASE_FILE: &str = "cortex.db";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Embedding size produced by the hash feature extractor.
pub const DEFAULT_DIMENSIONS: usize = 384;
const DEFAULT_NUM_HASHES: usize = 16;
const DEFAULT_FALLBACK_SCAN: usize = 100;

const DEFAULT_SEARCH_THRESHOLD: f32 = 0.3;
const DEFAULT_OVERFETCH: usize = 2;
const DEFAULT_RECENT_WINDOW: usize = 1000;

const DEFAULT_MAX_TEXT_CHARS: usize = 10_000;
const DEFAULT_MAX_KEYWORDS: usize = 10;
const DEFAULT_DEDUP_WINDOW_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_RELATED_EDGES: usize = 5;
const DEFAULT_EDGE_THRESHOLD: f32 = 0.5;
const DEFAULT_SNIPPET_CHARS: usize = 200;

const DEFAULT_ANALYTICS_WINDOW: usize = 10_000;
const DEFAULT_TOP_SITES: usize = 10;
const DEFAULT_TOP_CATEGORIES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("config file is not valid utf8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which vector index implementation backs the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Lsh,
    Brute,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Embedding dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Number of random hyperplanes (bits per bucket code)
    #[serde(default = "default_num_hashes")]
    pub num_hashes: usize,

    /// How many arbitrary vectors to scan when buckets come up short
    #[serde(default = "default_fallback_scan")]
    pub fallback_scan: usize,

    #[serde(default)]
    pub backend: IndexBackend,

    /// Fixed hyperplane seed. Random when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            num_hashes: DEFAULT_NUM_HASHES,
            fallback_scan: DEFAULT_FALLBACK_SCAN,
            backend: IndexBackend::default(),
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Minimum cosine similarity for vector candidates [0.0, 1.0]
    #[serde(default = "default_search_threshold")]
    pub threshold: f32,

    /// Vector candidates fetched per requested result
    #[serde(default = "default_overfetch")]
    pub overfetch: usize,

    /// Most-recent nodes scanned by related/recent/by-domain lookups
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SEARCH_THRESHOLD,
            overfetch: DEFAULT_OVERFETCH,
            recent_window: DEFAULT_RECENT_WINDOW,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Identical re-captures inside this window are dropped
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// How often expired de-dup entries are pruned
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Similar pages linked to each new capture
    #[serde(default = "default_related_edges")]
    pub related_edges: usize,

    /// Minimum similarity for a graph edge
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: f32,

    /// Length of the text prefix returned by page listings
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            max_keywords: DEFAULT_MAX_KEYWORDS,
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            related_edges: DEFAULT_RELATED_EDGES,
            edge_threshold: DEFAULT_EDGE_THRESHOLD,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Upper bound on nodes examined per aggregation
    #[serde(default = "default_analytics_window")]
    pub window: usize,

    #[serde(default = "default_top_sites")]
    pub top_sites: usize,

    #[serde(default = "default_top_categories")]
    pub top_categories: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_ANALYTICS_WINDOW,
            top_sites: DEFAULT_TOP_SITES,
            top_categories: DEFAULT_TOP_CATEGORIES,
        }
    }
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_num_hashes() -> usize {
    DEFAULT_NUM_HASHES
}

fn default_fallback_scan() -> usize {
    DEFAULT_FALLBACK_SCAN
}

fn default_search_threshold() -> f32 {
    DEFAULT_SEARCH_THRESHOLD
}

fn default_overfetch() -> usize {
    DEFAULT_OVERFETCH
}

fn default_recent_window() -> usize {
    DEFAULT_RECENT_WINDOW
}

fn default_max_text_chars() -> usize {
    DEFAULT_MAX_TEXT_CHARS
}

fn default_max_keywords() -> usize {
    DEFAULT_MAX_KEYWORDS
}

fn default_dedup_window_secs() -> u64 {
    DEFAULT_DEDUP_WINDOW_SECS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_related_edges() -> usize {
    DEFAULT_RELATED_EDGES
}

fn default_edge_threshold() -> f32 {
    DEFAULT_EDGE_THRESHOLD
}

fn default_snippet_chars() -> usize {
    DEFAULT_SNIPPET_CHARS
}

fn default_analytics_window() -> usize {
    DEFAULT_ANALYTICS_WINDOW
}

fn default_top_sites() -> usize {
    DEFAULT_TOP_SITES
}

fn default_top_categories() -> usize {
    DEFAULT_TOP_CATEGORIES
}

fn default_database_file() -> String {
    DEFAULT_DATABASE_FILE.to_string()
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            listen_addr: default_listen_addr(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            capture: CaptureConfig::default(),
            analytics: AnalyticsConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "index.dimensions must be greater than 0".to_string(),
            ));
        }

        if self.index.num_hashes == 0 || self.index.num_hashes > 32 {
            return Err(ConfigError::Invalid(format!(
                "index.num_hashes must be between 1 and 32, got {}",
                self.index.num_hashes
            )));
        }

        if !(0.0..=1.0).contains(&self.search.threshold) {
            return Err(ConfigError::Invalid(format!(
                "search.threshold must be between 0.0 and 1.0, got {}",
                self.search.threshold
            )));
        }

        if self.search.overfetch == 0 {
            return Err(ConfigError::Invalid(
                "search.overfetch must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.capture.edge_threshold) {
            return Err(ConfigError::Invalid(format!(
                "capture.edge_threshold must be between 0.0 and 1.0, got {}",
                self.capture.edge_threshold
            )));
        }

        if self.capture.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "capture.queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.capture.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "capture.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.analytics.window == 0 {
            return Err(ConfigError::Invalid(
                "analytics.window must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing defaults on first run.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let path = base_path.join(CONFIG_FILE_NAME);

        // create new if does not exist
        if !path.exists() {
            write_atomic(base_path, &path, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = String::from_utf8(std::fs::read(&path)?)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        write_atomic(
            &self.base_path,
            &self.base_path.join(CONFIG_FILE_NAME),
            config_str.as_bytes(),
        )?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn database_path(&self) -> PathBuf {
        self.base_path.join(&self.database_file)
    }
}

/// Write through a temp file and rename so readers never see a torn file.
fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(CONFIG_FILE_NAME);
    let temp_path = dir.join(format!("{}-{file_name}", new_ulid()));

    std::fs::write(&temp_path, data)?;
    std::fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE_NAME).exists());
        assert_eq!(config.index.dimensions, 384);
        assert_eq!(config.index.num_hashes, 16);
        assert_eq!(config.database_path(), tmp.path().join("cortex.db"));
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "search:\n  threshold: 0.5\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert!((config.search.threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.search.overfetch, 2);
        assert_eq!(config.analytics.window, 10_000);

        // upgraded file now lists every field
        let saved = std::fs::read_to_string(tmp.path().join(CONFIG_FILE_NAME)).unwrap();
        assert!(saved.contains("recent_window"));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "search:\n  threshold: 1.5\n",
        )
        .unwrap();

        let result = Config::load_with(tmp.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_index_backend_parses() {
        let config: Config = serde_yml::from_str("index:\n  backend: brute\n  seed: 7\n").unwrap();
        assert_eq!(config.index.backend, IndexBackend::Brute);
        assert_eq!(config.index.seed, Some(7));
    }
}
