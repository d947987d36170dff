//! URL extraction from free-text findings.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`\]\)]+"#).expect("url regex is valid"));

/// Return every distinct `http(s)` URL in `text`, in first-seen order.
///
/// Trailing sentence punctuation is not part of the URL.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']))
        .filter(|url| seen.insert(url.to_string()))
        .map(str::to_string)
        .collect()
}

/// Merge source lists, keeping first-seen order across all of them.
pub fn merge_sources<'a>(lists: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for url in list {
            if seen.insert(url.as_str()) {
                merged.push(url.clone());
            }
        }
    }
    merged
}
