//! Filename slugs and request ids.

use chrono::NaiveDateTime;

const MAX_SLUG_CHARS: usize = 50;

/// Lowercase, whitespace to `_`, drop everything but `[a-z0-9_-]`, cap length.
///
/// Non-ASCII letters are kept when alphanumeric so CJK topics still produce
/// readable names.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut last_underscore = false;
    for ch in text.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() || ch == '_' {
            if !last_underscore && !slug.is_empty() {
                slug.push('_');
                last_underscore = true;
            }
        } else if ch.is_alphanumeric() || ch == '-' {
            slug.push(ch);
            last_underscore = false;
        }
    }
    let slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

/// `<YYYYmmdd_HHMMSS>_<topic-slug>`.
pub fn request_id_base(topic: &str, at: NaiveDateTime) -> String {
    format!("{}_{}", at.format("%Y%m%d_%H%M%S"), slugify(topic))
}

/// First id derived from `base` that `taken` does not reject.
///
/// Suffixes `-2`, `-3`, ... are tried in order.
pub fn unique_id(base: &str, taken: impl Fn(&str) -> bool) -> Option<String> {
    if !taken(base) {
        return Some(base.to_string());
    }
    (2..=999u32)
        .map(|suffix| format!("{base}-{suffix}"))
        .find(|id| !taken(id))
}

/// `<NN>_<subtopic-slug>.md`.
pub fn note_file_name(position: usize, subtopic: &str) -> String {
    format!("{:02}_{}.md", position, slugify(subtopic))
}
