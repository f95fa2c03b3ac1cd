//! Request and response shapes shared by every adapter.

use serde::{Deserialize, Serialize};

use crate::capture::CaptureRequest;
use crate::features::preprocess::snippet;
use crate::ids::NodeId;
use crate::memory::{CaptureSettings, MemoryNode, PrivacyRule, RuleStatus, RuleType};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_RELATED_LIMIT: usize = 5;
const DEFAULT_RECENT_HOURS: u32 = 24;
const DEFAULT_RECENT_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Capture(CaptureRequest),
    Search {
        query: String,
        #[serde(default = "default_search_limit")]
        limit: usize,
    },
    ListPages {
        #[serde(default)]
        limit: Option<usize>,
    },
    GetStats,
    GetAnalytics,
    /// Domain, date range, or everything when both are absent
    #[serde(rename_all = "camelCase")]
    Forget {
        #[serde(default)]
        domain: Option<String>,
        #[serde(default)]
        date_range: Option<DateRange>,
    },
    GetSettings,
    UpdateSettings {
        settings: CaptureSettings,
    },
    ListPrivacyRules,
    AddPrivacyRule {
        rule: NewPrivacyRule,
    },
    UpdatePrivacyRule {
        rule: PrivacyRule,
    },
    DeletePrivacyRule {
        id: String,
    },
    RelatedPages {
        url: String,
        #[serde(default = "default_related_limit")]
        limit: usize,
    },
    RecentPages {
        #[serde(default = "default_recent_hours")]
        hours: u32,
        #[serde(default = "default_recent_limit")]
        limit: usize,
    },
    PagesByDomain {
        domain: String,
    },
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_related_limit() -> usize {
    DEFAULT_RELATED_LIMIT
}

fn default_recent_hours() -> u32 {
    DEFAULT_RECENT_HOURS
}

fn default_recent_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

/// Inclusive bounds, epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrivacyRule {
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub value: String,
    #[serde(default)]
    pub status: RuleStatus,
}

impl NewPrivacyRule {
    pub fn into_rule(self) -> PrivacyRule {
        let mut rule = PrivacyRule::new(self.rule_type, &self.value);
        rule.status = self.status;
        rule
    }
}

/// Envelope returned for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

/// Listing projection of a node; text is cut down to a snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub id: NodeId,
    pub url: String,
    pub title: String,
    pub timestamp: i64,
    pub keywords: Vec<String>,
    pub domain: String,
    pub snippet: String,
}

impl PageSummary {
    pub fn from_node(node: MemoryNode, snippet_chars: usize) -> Self {
        Self {
            snippet: snippet(&node.readable_text, snippet_chars),
            id: node.id,
            url: node.url,
            title: node.title,
            timestamp: node.timestamp,
            keywords: node.keywords,
            domain: node.metadata.domain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForgetResult {
    /// -1 when everything was cleared
    pub count: i64,
}
