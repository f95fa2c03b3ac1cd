//! Query side of the memory: hybrid search and window lookups.
//!
//! # Search pipeline
//!
//! 1. Embed the query with the feature extractor
//! 2. Vector search for `overfetch * limit` candidates above the threshold
//! 3. Keyword search over every stored node, top `limit`
//! 4. Boost both candidate sets with title and domain bonuses
//! 5. Merge by node id keeping the higher score, sort, truncate
//!
//! Search never fails: internal errors are logged and produce an empty
//! response.

pub mod boost;
pub mod lexical;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::features::{FeatureError, FeatureExtractor};
use crate::ids::NodeId;
use crate::memory::{now_millis, MemoryNode};
use crate::store::{Store, StoreError};

pub use boost::{MatchContext, MatchReason, QueryText};

/// Share of the base score a keyword hit can earn from term coverage.
const KEYWORD_BASE_WEIGHT: f32 = 0.5;

const MILLIS_PER_HOUR: i64 = 3_600_000;

#[derive(thiserror::Error, Debug)]
pub enum RecallError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("feature error: {0}")]
    Feature(#[from] FeatureError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub node_id: NodeId,
    /// Final boosted score
    pub similarity: f32,
    pub node: MemoryNode,
    pub reason: MatchReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub matches: Vec<SearchMatch>,
    pub query: String,
    pub timestamp: i64,
    pub total_results: usize,
}

impl SearchResponse {
    fn new(query: &str, matches: Vec<SearchMatch>) -> Self {
        Self {
            total_results: matches.len(),
            matches,
            query: query.to_string(),
            timestamp: now_millis(),
        }
    }
}

struct Candidate {
    node: MemoryNode,
    score: f32,
    /// Raw vector similarity, 0 for keyword-only hits
    semantic: f32,
}

pub struct RecallEngine {
    store: Store,
    extractor: Arc<dyn FeatureExtractor>,
    config: SearchConfig,
}

impl RecallEngine {
    pub fn new(store: Store, extractor: Arc<dyn FeatureExtractor>, config: SearchConfig) -> Self {
        Self {
            store,
            extractor,
            config,
        }
    }

    pub async fn search(&self, query: &str, limit: usize) -> SearchResponse {
        match self.try_search(query, limit).await {
            Ok(matches) => SearchResponse::new(query, matches),
            Err(e) => {
                log::warn!("search for {query:?} failed: {e}");
                SearchResponse::new(query, vec![])
            }
        }
    }

    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<SearchMatch>, RecallError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let query_text = QueryText::new(query);
        let mut candidates: HashMap<NodeId, Candidate> = HashMap::new();

        let query_vector = self.extractor.embed_query(query)?;
        let hits = self
            .store
            .vector_search(
                &query_vector,
                limit.saturating_mul(self.config.overfetch.max(1)),
                self.config.threshold,
            )
            .await?;
        let semantic_scores: HashMap<NodeId, f32> =
            hits.iter().map(|hit| (hit.id.clone(), hit.score)).collect();
        let ids: Vec<NodeId> = hits.into_iter().map(|hit| hit.id).collect();

        for node in self.store.get_nodes(&ids).await? {
            let semantic = semantic_scores.get(&node.id).copied().unwrap_or_default();
            let score = boost::hybrid_score(semantic, &query_text, &node);
            merge(
                &mut candidates,
                Candidate {
                    node,
                    score,
                    semantic,
                },
            );
        }

        let all_nodes = self.store.list_nodes(None).await?;
        let keyword_hits = lexical::score_keywords(&query_text.terms, &all_nodes);
        let total_terms = query_text.terms.len().max(1) as f32;
        let mut by_id: HashMap<&NodeId, &MemoryNode> =
            all_nodes.iter().map(|node| (&node.id, node)).collect();

        for hit in keyword_hits.into_iter().take(limit) {
            let Some(node) = by_id.remove(&hit.id) else {
                continue;
            };
            let base = KEYWORD_BASE_WEIGHT * hit.matched_terms as f32 / total_terms;
            let score = boost::hybrid_score(base, &query_text, node);
            merge(
                &mut candidates,
                Candidate {
                    node: node.clone(),
                    score,
                    semantic: 0.0,
                },
            );
        }

        let mut ranked: Vec<Candidate> = candidates.into_values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.node.timestamp.cmp(&a.node.timestamp))
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|candidate| SearchMatch {
                node_id: candidate.node.id.clone(),
                similarity: candidate.score,
                reason: boost::explain(&query_text, &candidate.node, candidate.semantic),
                node: candidate.node,
            })
            .collect())
    }

    /// Pages linked from the page captured at `url`, strongest link first.
    pub async fn related_pages(
        &self,
        url: &str,
        limit: usize,
    ) -> Result<Vec<MemoryNode>, RecallError> {
        let Some(source) = self.store.find_by_url(url).await? else {
            return Ok(vec![]);
        };

        let ids: Vec<NodeId> = self
            .store
            .edges_from(&source.id)
            .await?
            .into_iter()
            .filter(|edge| edge.to_node != source.id)
            .take(limit)
            .map(|edge| edge.to_node)
            .collect();

        Ok(self.store.get_nodes(&ids).await?)
    }

    /// Pages captured within the last `hours`, newest first.
    pub async fn recent_pages(
        &self,
        hours: u32,
        limit: usize,
    ) -> Result<Vec<MemoryNode>, RecallError> {
        let cutoff = now_millis() - i64::from(hours) * MILLIS_PER_HOUR;
        let window = self.store.list_nodes(Some(self.config.recent_window)).await?;

        Ok(window
            .into_iter()
            .filter(|node| node.timestamp >= cutoff)
            .take(limit)
            .collect())
    }

    pub async fn pages_by_domain(&self, domain: &str) -> Result<Vec<MemoryNode>, RecallError> {
        let window = self.store.list_nodes(Some(self.config.recent_window)).await?;

        Ok(window
            .into_iter()
            .filter(|node| node.domain().eq_ignore_ascii_case(domain))
            .collect())
    }
}

fn merge(candidates: &mut HashMap<NodeId, Candidate>, candidate: Candidate) {
    match candidates.get_mut(&candidate.node.id) {
        Some(existing) => {
            existing.semantic = existing.semantic.max(candidate.semantic);
            if candidate.score > existing.score {
                existing.score = candidate.score;
            }
        }
        None => {
            candidates.insert(candidate.node.id.clone(), candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::HashFeatureExtractor;
    use crate::memory::{Embedding, GraphEdge};
    use crate::store::test_store::{index_config, memory_store};
    use crate::store::StoreLocation;

    async fn engine_with(pages: &[(&str, &str, &str, &str, i64)]) -> RecallEngine {
        let store = memory_store(384).await;
        let extractor = Arc::new(HashFeatureExtractor::new(384, 10));

        for (url, title, text, domain, timestamp) in pages {
            let features = extractor.extract(title, text).unwrap();
            let mut node = MemoryNode::new(url, title, text, *timestamp, domain);
            node.keywords = features.keywords;
            node.embedding = Some(Embedding {
                vector: features.embedding,
                model: extractor.model_tag().to_string(),
                timestamp: *timestamp,
            });
            store.upsert_node(&node).await.unwrap();
        }

        RecallEngine::new(store, extractor, SearchConfig::default())
    }

    #[tokio::test]
    async fn test_search_ranks_title_match_first() {
        let engine = engine_with(&[
            (
                "https://react.dev/hooks",
                "React Hooks Guide",
                "Learn how useState and useEffect work in React components.",
                "react.dev",
                1,
            ),
            (
                "https://cooking.com/pasta",
                "Cooking Pasta",
                "Boil water, add salt, cook the pasta until al dente.",
                "cooking.com",
                2,
            ),
        ])
        .await;

        let response = engine.search("React", 10).await;

        assert!(response.total_results >= 1);
        assert_eq!(response.total_results, response.matches.len());
        let top = &response.matches[0];
        assert_eq!(top.node.title, "React Hooks Guide");
        assert_eq!(top.reason.context_match, "Title contains query terms");
        assert!(response
            .matches
            .iter()
            .all(|m| m.node.title != "Cooking Pasta" || m.similarity < top.similarity));
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_order() {
        let engine = engine_with(&[
            ("https://a.com/1", "Rust ownership", "borrow checker rules", "a.com", 1),
            ("https://a.com/2", "Rust traits", "generic rust code", "a.com", 2),
            ("https://a.com/3", "Rust macros", "macro_rules in rust", "a.com", 3),
        ])
        .await;

        let response = engine.search("rust", 2).await;
        assert_eq!(response.matches.len(), 2);
        assert!(response.matches[0].similarity >= response.matches[1].similarity);
        assert!(response.matches.iter().all(|m| m.similarity <= 1.0));
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let engine = engine_with(&[("https://a.com", "A", "b", "a.com", 1)]).await;
        let response = engine.search("   ", 10).await;
        assert_eq!(response.total_results, 0);
    }

    #[tokio::test]
    async fn test_search_degrades_to_empty_when_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(
            StoreLocation::File(dir.path().to_path_buf()),
            &index_config(384),
        );
        let engine = RecallEngine::new(
            store,
            Arc::new(HashFeatureExtractor::new(384, 10)),
            SearchConfig::default(),
        );

        let response = engine.search("react hooks", 10).await;
        assert_eq!(response.total_results, 0);
        assert!(response.matches.is_empty());
        assert_eq!(response.query, "react hooks");

        assert!(engine.recent_pages(24, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_related_pages_follow_edges() {
        let engine = engine_with(&[
            ("https://a.com/1", "One", "first", "a.com", 1),
            ("https://a.com/2", "Two", "second", "a.com", 2),
            ("https://a.com/3", "Three", "third", "a.com", 3),
        ])
        .await;
        let one = NodeId::from_url("https://a.com/1");
        for (to, strength) in [("https://a.com/2", 0.6), ("https://a.com/3", 0.9)] {
            engine
                .store
                .upsert_edge(&GraphEdge {
                    from_node: one.clone(),
                    to_node: NodeId::from_url(to),
                    strength,
                    timestamp: 4,
                })
                .await
                .unwrap();
        }

        let related = engine.related_pages("https://a.com/1", 10).await.unwrap();
        let titles: Vec<&str> = related.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Three", "Two"]);

        let capped = engine.related_pages("https://a.com/1", 1).await.unwrap();
        assert_eq!(capped.len(), 1);

        assert!(engine
            .related_pages("https://unknown.com", 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_recent_pages_and_by_domain() {
        let now = now_millis();
        let engine = engine_with(&[
            ("https://a.com/old", "Old", "x", "a.com", now - 48 * MILLIS_PER_HOUR),
            ("https://a.com/new", "New", "x", "a.com", now - MILLIS_PER_HOUR),
            ("https://b.com/new", "Other", "x", "b.com", now - 2 * MILLIS_PER_HOUR),
        ])
        .await;

        let recent = engine.recent_pages(24, 10).await.unwrap();
        let titles: Vec<&str> = recent.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Other"]);

        let by_domain = engine.pages_by_domain("a.com").await.unwrap();
        assert_eq!(by_domain.len(), 2);
        assert!(by_domain.iter().all(|n| n.domain() == "a.com"));
    }
}
