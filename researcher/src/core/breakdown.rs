//! Parsing of the decomposition reply into a [`Breakdown`].
//!
//! The model is asked for `{"topic": "...", "subtopics": [...]}` but replies
//! frequently wrap the object in a markdown fence or a sentence of prose.

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::Deserialize;
use serde_json::Value;

use crate::core::types::{Breakdown, Subtopics};

const BREAKDOWN_SCHEMA: &str = include_str!("../../schemas/breakdown.schema.json");

#[derive(Debug, Deserialize)]
struct RawBreakdown {
    #[serde(default)]
    topic: Option<String>,
    subtopics: Vec<String>,
}

/// Parse a decomposition reply.
///
/// `fallback_topic` is used when the reply omits `topic` or leaves it blank.
pub fn parse_breakdown(reply: &str, fallback_topic: &str) -> Result<Breakdown> {
    let payload = strip_code_fence(reply);
    let object = extract_json_object(payload)
        .ok_or_else(|| anyhow!("reply contains no JSON object"))?;
    let value: Value = serde_json::from_str(object).context("parse breakdown json")?;
    validate_schema(&value)?;
    let raw: RawBreakdown = serde_json::from_value(value).context("deserialize breakdown")?;

    let subtopics = Subtopics::new(raw.subtopics).map_err(|err| anyhow!(err))?;
    let topic = raw
        .topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_topic.trim().to_string());

    Ok(Breakdown { topic, subtopics })
}

/// Return the body of the first ```` ```json ```` (or bare ```` ``` ````) fence,
/// or the trimmed input when there is none.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let (marker, start) = if let Some(pos) = text.find("```json") {
        ("```json", pos)
    } else if let Some(pos) = text.find("```") {
        ("```", pos)
    } else {
        return text;
    };
    let body = &text[start + marker.len()..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Slice out the first balanced `{...}` object, honoring string literals.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(BREAKDOWN_SCHEMA).context("parse breakdown schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "breakdown schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let reply = r#"{"topic": "Renewable energy", "subtopics": ["Solar cost curves", "Offshore wind growth", "Grid storage"]}"#;
        let breakdown = parse_breakdown(reply, "renewable energy trends").expect("parse");
        assert_eq!(breakdown.topic, "Renewable energy");
        assert_eq!(
            breakdown.subtopics.as_slice(),
            &["Solar cost curves", "Offshore wind growth", "Grid storage"]
        );
    }

    #[test]
    fn parses_json_fence_with_prose() {
        let reply = "Here is the plan:\n```json\n{\"topic\": \"EVs\", \"subtopics\": [\"Battery chemistry\", \"Charging networks\"]}\n```\nGood luck!";
        let breakdown = parse_breakdown(reply, "electric vehicles").expect("parse");
        assert_eq!(breakdown.subtopics.len(), 2);
    }

    #[test]
    fn parses_bare_fence() {
        let reply = "```\n{\"topic\": \"EVs\", \"subtopics\": [\"a\", \"b\"]}\n```";
        let breakdown = parse_breakdown(reply, "evs").expect("parse");
        assert_eq!(breakdown.topic, "EVs");
    }

    #[test]
    fn extracts_object_surrounded_by_text() {
        let reply = r#"Sure! {"topic": "x {y}", "subtopics": ["a \"quoted\" }", "b"]} hope that helps"#;
        let breakdown = parse_breakdown(reply, "x").expect("parse");
        assert_eq!(breakdown.topic, "x {y}");
        assert_eq!(breakdown.subtopics.as_slice()[0], "a \"quoted\" }");
    }

    #[test]
    fn falls_back_to_user_topic_when_missing_or_blank() {
        let reply = r#"{"subtopics": ["a", "b"]}"#;
        let breakdown = parse_breakdown(reply, "  user topic ").expect("parse");
        assert_eq!(breakdown.topic, "user topic");

        let reply = r#"{"topic": "   ", "subtopics": ["a", "b"]}"#;
        let breakdown = parse_breakdown(reply, "user topic").expect("parse");
        assert_eq!(breakdown.topic, "user topic");
    }

    #[test]
    fn rejects_reply_without_json() {
        let err = parse_breakdown("I cannot help with that.", "t").unwrap_err();
        assert!(err.to_string().contains("no JSON object"));
    }

    #[test]
    fn rejects_schema_violations() {
        let err = parse_breakdown(r#"{"topic": "t", "subtopics": "a, b"}"#, "t").unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));

        let err = parse_breakdown(r#"{"topic": "t", "subtopics": [1, 2]}"#, "t").unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn rejects_wrong_subtopic_count() {
        let err = parse_breakdown(r#"{"subtopics": ["only"]}"#, "t").unwrap_err();
        assert!(format!("{err:#}").contains("got 1"));

        let err =
            parse_breakdown(r#"{"subtopics": ["a", "b", "c", "d", "e"]}"#, "t").unwrap_err();
        assert!(format!("{err:#}").contains("got 5"));
    }

    #[test]
    fn rejects_blank_subtopic() {
        let err = parse_breakdown(r#"{"subtopics": ["a", "  "]}"#, "t").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
