use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::str::FromStr;
use std::{fmt::Display, ops::Deref};

/// Stable identifier of a captured page.
///
/// Derived from the URL alone so that repeat visits land on the same record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Hash a URL into a node id. The fragment is ignored; scheme, host, path
    /// and query are kept as written.
    pub fn from_url(url: &str) -> NodeId {
        let normalized = normalize_url(url);

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = hasher.finalize();

        let hex = digest[..16]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();

        NodeId(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed
            .split('#')
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NodeId(s.to_string()))
    }
}

impl Deref for NodeId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(fr: &str) -> Self {
        NodeId(fr.to_string())
    }
}

impl From<String> for NodeId {
    fn from(fr: String) -> Self {
        NodeId(fr)
    }
}

impl From<NodeId> for String {
    fn from(fr: NodeId) -> Self {
        fr.0
    }
}

/// Fresh time-ordered identifier for privacy rules and clusters.
#[inline]
pub fn new_ulid() -> String {
    rusty_ulid::generate_ulid_string()
}
