use serde::{Deserialize, Serialize};

use crate::ids::{new_ulid, NodeId};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One captured page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    pub id: NodeId,
    pub url: String,
    pub title: String,
    pub readable_text: String,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
    /// Descending frequency, deduplicated
    #[serde(default)]
    pub keywords: Vec<String>,
    pub metadata: NodeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

impl MemoryNode {
    /// Node with its id derived from `url` and no features yet.
    pub fn new(url: &str, title: &str, readable_text: &str, timestamp: i64, domain: &str) -> Self {
        Self {
            id: NodeId::from_url(url),
            url: url.to_string(),
            title: title.to_string(),
            readable_text: readable_text.to_string(),
            timestamp,
            keywords: vec![],
            metadata: NodeMetadata {
                domain: domain.to_string(),
                favicon: None,
            },
            embedding: None,
        }
    }

    pub fn domain(&self) -> &str {
        &self.metadata.domain
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Embedding {
    pub vector: Vec<f32>,
    /// Which extractor produced the vector
    pub model: String,
    pub timestamp: i64,
}

/// Directed similarity link, keyed by `(from_node, to_node)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub strength: f32,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub node_ids: Vec<NodeId>,
    pub created_at: i64,
}

impl Cluster {
    pub fn new(label: &str, node_ids: Vec<NodeId>) -> Self {
        Self {
            id: new_ulid(),
            label: label.to_string(),
            node_ids,
            created_at: now_millis(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Domain,
    Date,
    Keyword,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    #[default]
    Active,
    Inactive,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Domain => "domain",
            RuleType::Date => "date",
            RuleType::Keyword => "keyword",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "domain" => Some(RuleType::Domain),
            "date" => Some(RuleType::Date),
            "keyword" => Some(RuleType::Keyword),
            _ => None,
        }
    }
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(RuleStatus::Active),
            "inactive" => Some(RuleStatus::Inactive),
            _ => None,
        }
    }
}

/// Capture-time privacy rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyRule {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub value: String,
    #[serde(default)]
    pub status: RuleStatus,
    pub created_at: i64,
}

impl PrivacyRule {
    pub fn new(rule_type: RuleType, value: &str) -> Self {
        Self {
            id: new_ulid(),
            rule_type,
            value: value.to_string(),
            status: RuleStatus::Active,
            created_at: now_millis(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }
}

const DEFAULT_MAX_STORAGE_MB: u64 = 500;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub excluded_domains: Vec<String>,
    #[serde(default)]
    pub excluded_keywords: Vec<String>,
    /// Advisory only
    #[serde(default = "default_max_storage_mb")]
    pub max_storage_mb: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            excluded_domains: vec![],
            excluded_keywords: vec![],
            max_storage_mb: DEFAULT_MAX_STORAGE_MB,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_storage_mb() -> u64 {
    DEFAULT_MAX_STORAGE_MB
}
