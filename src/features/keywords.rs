//! Frequency-ranked keyword extraction.

use std::collections::HashMap;

use super::preprocess::words;

/// Words too common to say anything about a page.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "in", "on", "at", "to",
    "for", "of", "with", "by", "from", "as", "and", "or", "but", "not", "no", "so", "if", "then",
    "this", "that", "these", "those", "it", "its", "you", "your", "we", "our", "they", "their",
    "he", "she", "his", "her", "i", "me", "my", "can", "will", "would", "should", "could", "has",
    "have", "had", "do", "does", "did", "all", "any", "more", "most", "some", "such", "than",
    "too", "very", "just", "also", "how", "what", "when", "where", "which", "who", "why", "about",
    "into", "over", "after", "before", "here", "there", "out", "up", "down", "new", "get", "use",
];

/// Minimum keyword length in characters
const MIN_KEYWORD_LEN: usize = 3;

/// Title words count as this many body occurrences
const TITLE_WEIGHT: usize = 2;

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

fn is_keyword_candidate(word: &str) -> bool {
    word.chars().count() >= MIN_KEYWORD_LEN
        && !is_stop_word(word)
        && !word.chars().all(|c| c.is_ascii_digit())
}

/// Extract up to `limit` keywords from a page.
///
/// Ordered by descending frequency, ties broken by first appearance
/// (title first, then text). Every keyword appears once.
pub fn extract_keywords(title: &str, text: &str, limit: usize) -> Vec<String> {
    // word -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0usize;

    let title_words = words(title).map(|w| (w, TITLE_WEIGHT));
    let text_words = words(text).map(|w| (w, 1));

    for (word, weight) in title_words.chain(text_words) {
        if !is_keyword_candidate(&word) {
            continue;
        }

        let entry = counts.entry(word).or_insert((0, position));
        entry.0 += weight;
        position += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();

    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
    ranked.truncate(limit);

    ranked.into_iter().map(|(word, _, _)| word).collect()
}
