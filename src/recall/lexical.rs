//! Keyword scoring for hybrid search.
//!
//! A node's score is the number of distinct query terms found in its title,
//! text or keywords. Occurrence weights only break ties.

use crate::features::keywords::is_stop_word;
use crate::ids::NodeId;
use crate::memory::MemoryNode;

/// Result of keyword scoring.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub id: NodeId,
    /// Number of distinct query terms matched
    pub matched_terms: usize,
    /// Weighted occurrences across fields, tie-breaker only
    pub total_hits: f32,
}

/// Lowercase, distinct query terms. Single characters and stop words are
/// dropped.
pub fn tokenize(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query
        .split(|c: char| !c.is_alphanumeric())
        .map(|s| s.to_lowercase())
        .filter(|s| s.chars().count() > 1 && !is_stop_word(s))
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Score nodes against query terms.
///
/// Returns hits sorted by matched_terms DESC, total_hits DESC. Nodes without
/// any match are left out.
pub fn score_keywords(terms: &[String], nodes: &[MemoryNode]) -> Vec<KeywordHit> {
    if terms.is_empty() {
        return vec![];
    }

    let mut results: Vec<KeywordHit> = nodes
        .iter()
        .filter_map(|node| {
            let (matched_terms, total_hits) =
                count_matches(terms, &node.title, &node.readable_text, &node.keywords);

            (matched_terms > 0).then(|| KeywordHit {
                id: node.id.clone(),
                matched_terms,
                total_hits,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.matched_terms
            .cmp(&a.matched_terms)
            .then_with(|| {
                b.total_hits
                    .partial_cmp(&a.total_hits)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });

    results
}

fn count_matches(terms: &[String], title: &str, text: &str, keywords: &[String]) -> (usize, f32) {
    let title_lower = title.to_lowercase();
    let text_lower = text.to_lowercase();

    let mut matched_terms = 0;
    let mut total_hits: f32 = 0.0;

    for term in terms {
        let mut term_hits: f32 = 0.0;

        if title_lower.contains(term.as_str()) {
            term_hits += 2.0;
        }
        if text_lower.contains(term.as_str()) {
            term_hits += 1.0;
        }
        if keywords.iter().any(|k| k.eq_ignore_ascii_case(term)) {
            term_hits += 3.0;
        }

        if term_hits > 0.0 {
            matched_terms += 1;
            total_hits += term_hits;
        }
    }

    (matched_terms, total_hits)
}
