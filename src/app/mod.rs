//! The assembled memory: store, capture pipeline, recall and analytics
//! behind one message dispatcher.

pub mod errors;
pub mod messages;

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::analytics::AnalyticsAggregator;
use crate::capture::CapturePipeline;
use crate::config::Config;
use crate::features::{FeatureExtractor, HashFeatureExtractor};
use crate::recall::RecallEngine;
use crate::store::{Store, StoreLocation};

pub use errors::AppError;
pub use messages::{DateRange, ForgetResult, NewPrivacyRule, PageSummary, Request, Response};

pub struct App {
    config: Config,
    store: Store,
    capture: CapturePipeline,
    recall: RecallEngine,
    analytics: AnalyticsAggregator,
}

impl App {
    /// Open the database configured in `config`.
    pub fn start(config: Config) -> App {
        let location = StoreLocation::File(config.database_path());
        App::start_at(config, location)
    }

    /// Wire every component against a store at `location`. Must be called
    /// inside a tokio runtime; the store finishes opening in the background.
    pub fn start_at(config: Config, location: StoreLocation) -> App {
        let store = Store::open(location, &config.index);
        let extractor: Arc<dyn FeatureExtractor> = Arc::new(HashFeatureExtractor::new(
            config.index.dimensions,
            config.capture.max_keywords,
        ));

        App {
            capture: CapturePipeline::start(
                store.clone(),
                extractor.clone(),
                config.capture.clone(),
            ),
            recall: RecallEngine::new(store.clone(), extractor, config.search.clone()),
            analytics: AnalyticsAggregator::new(store.clone(), config.analytics.clone()),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one request. Failures become error envelopes.
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.handle(request).await {
            Ok(data) => Response::ok(data),
            Err(err) => {
                log::warn!("request failed: {err}");
                Response::error(err)
            }
        }
    }

    async fn handle(&self, request: Request) -> Result<serde_json::Value, AppError> {
        match request {
            Request::Capture(capture) => to_json(&self.capture.capture(capture).await?),

            Request::Search { query, limit } => to_json(&self.recall.search(&query, limit).await),

            Request::ListPages { limit } => {
                let snippet_chars = self.config.capture.snippet_chars;
                let pages: Vec<PageSummary> = self
                    .store
                    .list_nodes(limit)
                    .await?
                    .into_iter()
                    .map(|node| PageSummary::from_node(node, snippet_chars))
                    .collect();
                to_json(&pages)
            }

            Request::GetStats => to_json(&self.store.get_stats().await?),

            Request::GetAnalytics => to_json(&self.analytics.compute().await?),

            Request::Forget { domain, date_range } => {
                let count = self.forget(domain, date_range).await?;
                to_json(&ForgetResult { count })
            }

            Request::GetSettings => to_json(&self.store.get_settings().await?),

            Request::UpdateSettings { settings } => {
                self.store.update_settings(&settings).await?;
                to_json(&settings)
            }

            Request::ListPrivacyRules => to_json(&self.store.list_privacy_rules().await?),

            Request::AddPrivacyRule { rule } => {
                let rule = rule.into_rule();
                rule.validate()?;
                self.store.add_privacy_rule(&rule).await?;
                log::info!("added {} privacy rule {}", rule.rule_type.as_str(), rule.value);
                to_json(&rule)
            }

            Request::UpdatePrivacyRule { rule } => {
                rule.validate()?;
                let updated = self.store.update_privacy_rule(&rule).await?;
                Ok(json!({ "updated": updated }))
            }

            Request::DeletePrivacyRule { id } => {
                let deleted = self.store.delete_privacy_rule(&id).await?;
                Ok(json!({ "deleted": deleted }))
            }

            Request::RelatedPages { url, limit } => {
                to_json(&self.recall.related_pages(&url, limit).await?)
            }

            Request::RecentPages { hours, limit } => {
                to_json(&self.recall.recent_pages(hours, limit).await?)
            }

            Request::PagesByDomain { domain } => {
                to_json(&self.recall.pages_by_domain(&domain).await?)
            }
        }
    }

    /// Returns the number of pages removed, or -1 after a full wipe.
    async fn forget(
        &self,
        domain: Option<String>,
        date_range: Option<DateRange>,
    ) -> Result<i64, AppError> {
        match (domain, date_range) {
            (Some(_), Some(_)) => Err(AppError::InvalidRequest(
                "forget takes a domain or a date range, not both".to_string(),
            )),
            (Some(domain), None) => Ok(self.store.delete_by_domain(&domain).await? as i64),
            (None, Some(range)) => {
                if range.start > range.end {
                    return Err(AppError::InvalidRequest(format!(
                        "date range start {} is after end {}",
                        range.start, range.end
                    )));
                }
                Ok(self.store.delete_by_date_range(range.start, range.end).await? as i64)
            }
            (None, None) => {
                self.store.clear_all().await?;
                Ok(-1)
            }
        }
    }

    /// Wait for every accepted capture to be stored.
    pub async fn flush(&self) -> Result<(), AppError> {
        Ok(self.capture.flush().await?)
    }

    /// Drain the capture queue and stop it.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        log::warn!("waiting for capture queue to stop");
        Ok(self.capture.shutdown().await?)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    Ok(serde_json::to_value(value)?)
}
