//! Text preparation shared by capture and query paths.
//!
//! 1. Collapse whitespace
//! 2. Truncate to a char budget without splitting UTF-8 sequences
//! 3. Hash title + text for re-capture change detection

/// Ellipsis suffix when a snippet is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bound extracted page text to `max_chars` characters.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Short prefix of page text for listings, with ellipsis when cut.
pub fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(TRUNCATION_SUFFIX.len());
    format!("{}{}", truncate_text(text, keep).trim_end(), TRUNCATION_SUFFIX)
}

/// Hash of the captured content, used to recognise identical re-captures.
pub fn content_hash(title: &str, text: &str) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    title.trim().hash(&mut hasher);
    text.trim().hash(&mut hasher);
    hasher.finish()
}

/// Lowercase alphanumeric word tokens.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}
