//! Prompt rendering for the three pipeline stages.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::ResearchNote;

const DECOMPOSE_TEMPLATE: &str = include_str!("prompts/decompose.md");
const RESEARCH_TEMPLATE: &str = include_str!("prompts/research.md");
const SYNTHESIZE_TEMPLATE: &str = include_str!("prompts/synthesize.md");

pub const DECOMPOSE_SYSTEM: &str = "You are a research coordinator who breaks down complex topics into focused subtopics. Respond ONLY with valid JSON.";
pub const RESEARCH_SYSTEM: &str = "You are a thorough research assistant with access to web search. Always search the web for current information.";
pub const SYNTHESIZE_SYSTEM: &str = "You are a professional report writer who synthesizes research into clear, well-organized documents.";

const TRUNCATED_MARKER: &str = "\n[truncated]";

/// Note fields exposed to the synthesis template.
#[derive(Debug, Clone, Serialize)]
struct NoteContext {
    file: String,
    subtopic: String,
    findings: String,
}

impl NoteContext {
    fn from_note(note: &ResearchNote) -> Self {
        let file = note
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            file,
            subtopic: note.subtopic.clone(),
            findings: note.findings.trim().to_string(),
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptEngine {
    /// Create an engine whose synthesis prompt keeps combined findings within `budget_bytes`.
    pub fn new(budget_bytes: usize) -> Self {
        let mut env = Environment::new();
        env.add_template("decompose", DECOMPOSE_TEMPLATE)
            .expect("decompose template should be valid");
        env.add_template("research", RESEARCH_TEMPLATE)
            .expect("research template should be valid");
        env.add_template("synthesize", SYNTHESIZE_TEMPLATE)
            .expect("synthesize template should be valid");
        Self { env, budget_bytes }
    }

    pub fn render_decompose(&self, topic: &str) -> Result<String> {
        let template = self.env.get_template("decompose")?;
        Ok(template.render(context! { topic => topic.trim() })?)
    }

    /// `topic` is the parent topic, omitted from the prompt when blank.
    pub fn render_research(&self, subtopic: &str, topic: &str) -> Result<String> {
        let template = self.env.get_template("research")?;
        Ok(template.render(context! {
            subtopic => subtopic.trim(),
            topic => (!topic.trim().is_empty()).then(|| topic.trim()),
        })?)
    }

    pub fn render_synthesize(&self, topic: &str, notes: &[ResearchNote]) -> Result<String> {
        let mut contexts: Vec<NoteContext> = notes.iter().map(NoteContext::from_note).collect();
        apply_budget_to_notes(&mut contexts, self.budget_bytes);
        let template = self.env.get_template("synthesize")?;
        Ok(template.render(context! {
            topic => topic.trim(),
            notes => contexts,
        })?)
    }
}

/// Truncate findings so their combined length fits `budget`.
///
/// Notes under an even share keep their full text; the remaining budget is
/// split evenly across the longer ones.
fn apply_budget_to_notes(notes: &mut [NoteContext], budget: usize) {
    let total: usize = notes.iter().map(|n| n.findings.len()).sum();
    if total <= budget || notes.is_empty() {
        return;
    }

    let mut remaining_budget = budget;
    let mut remaining_notes = notes.len();
    let mut order: Vec<usize> = (0..notes.len()).collect();
    order.sort_by_key(|&i| notes[i].findings.len());

    for idx in order {
        let share = remaining_budget / remaining_notes;
        let note = &mut notes[idx];
        let before_len = note.findings.len();
        if before_len > share {
            truncate_with_marker(&mut note.findings, share);
            debug!(
                subtopic = %note.subtopic,
                before_len,
                after_len = note.findings.len(),
                "truncated note for prompt budget"
            );
        }
        remaining_budget = remaining_budget.saturating_sub(note.findings.len());
        remaining_notes -= 1;
    }
}

fn truncate_with_marker(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let keep = max_bytes.saturating_sub(TRUNCATED_MARKER.len());
    let mut cut = keep;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    if max_bytes >= TRUNCATED_MARKER.len() {
        text.push_str(TRUNCATED_MARKER);
    }
}
