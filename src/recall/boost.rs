//! Hybrid score boosting and match explanations.
//!
//! A base similarity is raised by at most one title bonus and at most one
//! domain bonus, then capped at 1.0.

use serde::{Deserialize, Serialize};

use super::lexical::tokenize;
use crate::memory::MemoryNode;

const EXACT_TITLE_BONUS: f32 = 0.4;
const TITLE_CONTAINS_BONUS: f32 = 0.25;
const TITLE_ALL_WORDS_BONUS: f32 = 0.2;
const TITLE_SOME_WORDS_BONUS: f32 = 0.1;

const DOMAIN_CONTAINS_BONUS: f32 = 0.15;
const DOMAIN_SOME_WORDS_BONUS: f32 = 0.08;

/// Lowercased query with its terms, computed once per search.
#[derive(Debug, Clone)]
pub struct QueryText {
    pub lower: String,
    pub terms: Vec<String>,
}

impl QueryText {
    pub fn new(query: &str) -> Self {
        Self {
            lower: query.trim().to_lowercase(),
            terms: tokenize(query),
        }
    }

    fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    fn contained_in(&self, haystack: &str) -> bool {
        !self.is_empty() && haystack.contains(self.lower.as_str())
    }

    fn all_terms_in(&self, haystack: &str) -> bool {
        !self.terms.is_empty() && self.terms.iter().all(|t| haystack.contains(t.as_str()))
    }

    fn any_term_in(&self, haystack: &str) -> bool {
        self.terms.iter().any(|t| haystack.contains(t.as_str()))
    }
}

fn title_bonus(query: &QueryText, title: &str) -> f32 {
    if query.is_empty() {
        return 0.0;
    }

    if title == query.lower {
        EXACT_TITLE_BONUS
    } else if query.contained_in(title) {
        TITLE_CONTAINS_BONUS
    } else if query.all_terms_in(title) {
        TITLE_ALL_WORDS_BONUS
    } else if query.any_term_in(title) {
        TITLE_SOME_WORDS_BONUS
    } else {
        0.0
    }
}

fn domain_bonus(query: &QueryText, domain: &str) -> f32 {
    if query.contained_in(domain) {
        DOMAIN_CONTAINS_BONUS
    } else if query.any_term_in(domain) {
        DOMAIN_SOME_WORDS_BONUS
    } else {
        0.0
    }
}

/// Base similarity plus title and domain bonuses, capped at 1.0.
pub fn hybrid_score(similarity: f32, query: &QueryText, node: &MemoryNode) -> f32 {
    let title = node.title.trim().to_lowercase();
    let domain = node.domain().to_lowercase();

    (similarity + title_bonus(query, &title) + domain_bonus(query, &domain)).min(1.0)
}

/// Why a node matched, strongest signal first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchContext {
    ExactTitle,
    TitleContains,
    DomainContains,
    ContentContains,
    SharedKeywords,
    Semantic,
}

impl MatchContext {
    pub fn label(&self) -> &'static str {
        match self {
            MatchContext::ExactTitle => "Exact title match",
            MatchContext::TitleContains => "Title contains query terms",
            MatchContext::DomainContains => "Domain matches query",
            MatchContext::ContentContains => "Content contains query terms",
            MatchContext::SharedKeywords => "Shares keywords with query",
            MatchContext::Semantic => "Semantic similarity match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReason {
    pub shared_keywords: Vec<String>,
    pub context_match: String,
    pub semantic_similarity: f32,
}

/// Node keywords that equal a query term.
pub fn shared_keywords(query: &QueryText, node: &MemoryNode) -> Vec<String> {
    node.keywords
        .iter()
        .filter(|k| query.terms.iter().any(|t| k.eq_ignore_ascii_case(t)))
        .cloned()
        .collect()
}

pub fn match_context(query: &QueryText, node: &MemoryNode, shared: &[String]) -> MatchContext {
    let title = node.title.trim().to_lowercase();
    let domain = node.domain().to_lowercase();

    if !query.is_empty() && title == query.lower {
        return MatchContext::ExactTitle;
    }
    if query.contained_in(&title) || query.all_terms_in(&title) {
        return MatchContext::TitleContains;
    }
    if query.contained_in(&domain) {
        return MatchContext::DomainContains;
    }

    let text = node.readable_text.to_lowercase();
    if query.contained_in(&text) || query.all_terms_in(&text) {
        return MatchContext::ContentContains;
    }
    if !shared.is_empty() {
        return MatchContext::SharedKeywords;
    }

    MatchContext::Semantic
}

pub fn explain(query: &QueryText, node: &MemoryNode, semantic_similarity: f32) -> MatchReason {
    let shared = shared_keywords(query, node);
    let context = match_context(query, node, &shared);

    MatchReason {
        shared_keywords: shared,
        context_match: context.label().to_string(),
        semantic_similarity,
    }
}
