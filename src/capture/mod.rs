//! Capture pipeline.
//!
//! `capture` validates and filters a visited page and answers right away.
//! Accepted pages go onto a background queue that extracts features,
//! stores the node with its embedding and links it to similar pages.
//!
//! Filters, in order: capture disabled, excluded domain, excluded keyword,
//! active privacy rule, recent identical capture.

mod dedup;
mod task_runner;

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::config::CaptureConfig;
use crate::features::preprocess::{content_hash, normalize_whitespace, truncate_text};
use crate::features::{FeatureError, FeatureExtractor};
use crate::ids::NodeId;
use crate::memory::{now_millis, CaptureSettings, MemoryNode};
use crate::rules::{self, CaptureRecord};
use crate::store::{Store, StoreError};

pub use dedup::SessionDedup;
use task_runner::{start_queue, Task, Worker};

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("capture queue is closed")]
    QueueClosed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    /// Epoch milliseconds, now when absent
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Host of `url` when absent
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    pub node_id: NodeId,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl CaptureOutcome {
    fn accepted(node_id: NodeId) -> Self {
        Self {
            node_id,
            accepted: true,
            skip_reason: None,
        }
    }

    fn skipped(node_id: NodeId, reason: impl Into<String>) -> Self {
        Self {
            node_id,
            accepted: false,
            skip_reason: Some(reason.into()),
        }
    }
}

/// Parsed capture target: lowercase host plus the domain recorded on the node.
struct Target {
    host: String,
    domain: String,
}

fn parse_target(request: &CaptureRequest) -> Result<Target, String> {
    let url = url::Url::parse(request.url.trim()).map_err(|e| format!("invalid url: {e}"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported url scheme: {}", url.scheme()));
    }

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| "url has no host".to_string())?
        .to_lowercase();

    let domain = request
        .domain
        .as_deref()
        .map(str::trim)
        .filter(|domain| !domain.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| host.clone());

    Ok(Target { host, domain })
}

/// Reason the settings exclude this capture, if any.
fn excluded_by_settings(
    settings: &CaptureSettings,
    record: &CaptureRecord,
    domain: &str,
) -> Option<String> {
    if !settings.enabled {
        return Some("capture is disabled".to_string());
    }

    for excluded in &settings.excluded_domains {
        let hit = rules::is_domain_matches(excluded, record.host)
            .and_then(|host_hit| Ok(host_hit || rules::is_domain_matches(excluded, domain)?));
        match hit {
            Ok(true) => return Some(format!("excluded domain: {excluded}")),
            Ok(false) => {}
            Err(e) => log::warn!("ignoring excluded domain {excluded}: {e}"),
        }
    }

    for keyword in &settings.excluded_keywords {
        if keyword.trim().is_empty() {
            continue;
        }
        let hit = [record.url, record.title, record.text]
            .iter()
            .try_fold(false, |found, field| {
                Ok::<bool, rules::RuleError>(found || rules::is_string_matches(keyword, field)?)
            });
        match hit {
            Ok(true) => return Some(format!("excluded keyword: {keyword}")),
            Ok(false) => {}
            Err(e) => log::warn!("ignoring excluded keyword {keyword}: {e}"),
        }
    }

    None
}

pub struct CapturePipeline {
    store: Store,
    config: CaptureConfig,
    dedup: Arc<SessionDedup>,
    task_tx: mpsc::Sender<Task>,
}

impl CapturePipeline {
    /// Spawn the ingest queue and the de-dup sweeper. Must be called inside a
    /// tokio runtime.
    pub fn start(
        store: Store,
        extractor: Arc<dyn FeatureExtractor>,
        config: CaptureConfig,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::channel(config.queue_capacity.max(1));

        let dedup = Arc::new(SessionDedup::new(Duration::from_secs(
            config.dedup_window_secs,
        )));

        tokio::spawn(start_queue(
            task_rx,
            Worker {
                store: store.clone(),
                extractor,
                config: config.clone(),
                dedup: dedup.clone(),
            },
        ));

        tokio::spawn(sweep_dedup(
            Arc::downgrade(&dedup),
            Duration::from_secs(config.sweep_interval_secs.max(1)),
        ));

        Self {
            store,
            config,
            dedup,
            task_tx,
        }
    }

    pub async fn capture(&self, request: CaptureRequest) -> Result<CaptureOutcome, CaptureError> {
        let node_id = NodeId::from_url(&request.url);

        let target = match parse_target(&request) {
            Ok(target) => target,
            Err(reason) => {
                log::debug!("capture of {:?} skipped: {reason}", request.url);
                return Ok(CaptureOutcome::skipped(node_id, reason));
            }
        };

        let timestamp = request.timestamp.unwrap_or_else(now_millis);
        let text = truncate_text(&normalize_whitespace(&request.text), self.config.max_text_chars);
        let title = request.title.trim().to_string();

        let record = CaptureRecord {
            url: &request.url,
            host: &target.host,
            title: &title,
            text: &text,
            timestamp,
        };

        let settings = self.store.get_settings().await?;
        if let Some(reason) = excluded_by_settings(&settings, &record, &target.domain) {
            return Ok(CaptureOutcome::skipped(node_id, reason));
        }

        let privacy_rules = self.store.list_privacy_rules().await?;
        if let Some(rule) = rules::find_blocking_rule(&privacy_rules, &record) {
            return Ok(CaptureOutcome::skipped(
                node_id,
                format!("blocked by {} rule: {}", rule.rule_type.as_str(), rule.value),
            ));
        }

        if self.dedup.check(&node_id, content_hash(&title, &text)) {
            return Ok(CaptureOutcome::skipped(node_id, "duplicate of a recent capture"));
        }

        let mut node = MemoryNode::new(&request.url, &title, &text, timestamp, &target.domain);
        node.metadata.favicon = request.favicon.filter(|favicon| !favicon.is_empty());

        if self.task_tx.send(Task::Ingest(node)).await.is_err() {
            self.dedup.forget(&node_id);
            return Err(CaptureError::QueueClosed);
        }

        Ok(CaptureOutcome::accepted(node_id))
    }

    /// Wait until every capture accepted so far has been processed.
    pub async fn flush(&self) -> Result<(), CaptureError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.task_tx
            .send(Task::Flush(done_tx))
            .await
            .map_err(|_| CaptureError::QueueClosed)?;
        done_rx.await.map_err(|_| CaptureError::QueueClosed)
    }

    /// Finish queued work and stop the queue.
    pub async fn shutdown(&self) -> Result<(), CaptureError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.task_tx
            .send(Task::Shutdown(done_tx))
            .await
            .map_err(|_| CaptureError::QueueClosed)?;
        done_rx.await.map_err(|_| CaptureError::QueueClosed)
    }
}

async fn sweep_dedup(dedup: Weak<SessionDedup>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(dedup) = dedup.upgrade() else {
            return;
        };
        let removed = dedup.sweep();
        if removed > 0 {
            log::debug!("pruned {removed} expired capture entries");
        }
    }
}
