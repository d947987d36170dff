//! Shared data types for a research request.
//!
//! These types carry no I/O. Timestamps are passed in by the caller so that
//! construction stays deterministic under test.

use std::path::PathBuf;

use chrono::NaiveDateTime;

/// Minimum number of subtopics a decomposition may produce.
pub const MIN_SUBTOPICS: usize = 2;
/// Maximum number of subtopics a decomposition may produce.
pub const MAX_SUBTOPICS: usize = 4;

/// A single research request created from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchRequest {
    /// Identifier scoping this request's notes and report.
    pub id: String,
    /// Topic as typed by the user.
    pub topic: String,
    pub started_at: NaiveDateTime,
}

/// Ordered, validated list of 2..=4 non-empty subtopics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtopics(Vec<String>);

impl Subtopics {
    /// Trim every entry and check count and emptiness.
    pub fn new(items: Vec<String>) -> Result<Self, String> {
        let items: Vec<String> = items.into_iter().map(|s| s.trim().to_string()).collect();
        if let Some(pos) = items.iter().position(|s| s.is_empty()) {
            return Err(format!("subtopic {} is empty", pos + 1));
        }
        if !(MIN_SUBTOPICS..=MAX_SUBTOPICS).contains(&items.len()) {
            return Err(format!(
                "expected {MIN_SUBTOPICS}-{MAX_SUBTOPICS} subtopics, got {}",
                items.len()
            ));
        }
        Ok(Self(items))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a Subtopics {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Result of the decomposition stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakdown {
    /// Topic name suggested by the model, falling back to the user's topic.
    pub topic: String,
    pub subtopics: Subtopics,
}

/// Persisted findings for one subtopic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchNote {
    /// Id of the request that produced this note.
    pub request_id: String,
    /// 1-based position among the request's notes.
    pub position: usize,
    pub subtopic: String,
    pub findings: String,
    /// URLs cited in `findings`, in first-seen order.
    pub sources: Vec<String>,
    pub created_at: NaiveDateTime,
    /// File the note was written to.
    pub path: PathBuf,
}

/// Final synthesized document for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub request_id: String,
    pub topic: String,
    /// Note files the report was built from, in research order.
    pub note_paths: Vec<PathBuf>,
    pub content: String,
    pub generated_at: NaiveDateTime,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn subtopics_accepts_two_to_four() {
        for n in MIN_SUBTOPICS..=MAX_SUBTOPICS {
            let items = (0..n).map(|i| format!("topic {i}")).collect();
            let subtopics = Subtopics::new(items).expect("valid count");
            assert_eq!(subtopics.len(), n);
        }
    }

    #[test]
    fn subtopics_rejects_out_of_range_counts() {
        let err = Subtopics::new(strings(&["only one"])).unwrap_err();
        assert!(err.contains("got 1"));
        let err = Subtopics::new(strings(&["a", "b", "c", "d", "e"])).unwrap_err();
        assert!(err.contains("got 5"));
    }

    #[test]
    fn subtopics_trims_and_rejects_blank_entries() {
        let subtopics = Subtopics::new(strings(&["  solar costs ", "wind\n"])).expect("valid");
        assert_eq!(subtopics.as_slice(), &["solar costs", "wind"]);

        let err = Subtopics::new(strings(&["solar", "   "])).unwrap_err();
        assert_eq!(err, "subtopic 2 is empty");
    }
}
