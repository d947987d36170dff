//! Interactive research session.
//!
//! Reads one topic per line and runs the full pipeline for each. A failing
//! request is reported and the session continues.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::io::client::ChatClient;
use crate::io::session_log::{LogEntry, SessionLog};
use crate::pipeline::{Pipeline, PipelineEvent, RunOutcome};

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

/// Totals for a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatSummary {
    pub completed: usize,
    pub failed: usize,
}

/// Whether `line` ends the session.
pub fn is_exit(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || EXIT_WORDS.iter().any(|w| line.eq_ignore_ascii_case(w))
}

/// Run the read-research-report loop until an exit word, an empty line, or EOF.
pub fn run_chat<C, R, W>(
    pipeline: &Pipeline<'_, C>,
    log: &SessionLog,
    preview_chars: usize,
    mut input: R,
    mut out: W,
) -> Result<ChatSummary>
where
    C: ChatClient,
    R: BufRead,
    W: Write,
{
    writeln!(out, "\n=== Research Agent ===")?;
    writeln!(
        out,
        "Ask me to research any topic. I will break it into subtopics, research each with web search, and write a report."
    )?;
    writeln!(out, "\nSession logs: {}", log.dir().display())?;
    writeln!(out, "Type 'exit' or 'quit' to end.")?;

    let mut summary = ChatSummary::default();
    let mut line = String::new();
    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;
        line.clear();
        let read = input.read_line(&mut line).context("read input")?;
        if read == 0 || is_exit(&line) {
            break;
        }
        let topic = line.trim();
        if let Err(err) = log.append(&LogEntry::Message(&format!("\nUser: {topic}\n"))) {
            warn!(error = %format!("{err:#}"), "failed to append session transcript");
        }
        debug!(topic, "chat request");

        match run_one(pipeline, topic, preview_chars, &mut out) {
            Ok(_) => summary.completed += 1,
            Err(err) => {
                summary.failed += 1;
                writeln!(out, "\n✗ {err}")?;
            }
        }
    }

    writeln!(
        out,
        "\nGoodbye! Session logs saved to: {}",
        log.dir().display()
    )?;
    Ok(summary)
}

/// Run one request, printing progress to `out`.
pub fn run_one<C: ChatClient, W: Write>(
    pipeline: &Pipeline<'_, C>,
    topic: &str,
    preview_chars: usize,
    out: &mut W,
) -> Result<RunOutcome, PipelineError> {
    // Console output is best-effort; a closed stdout must not abort research.
    pipeline.run_with_events(topic, |event| {
        let _ = print_event(&mut *out, &event, preview_chars);
    })
}

fn print_event<W: Write>(out: &mut W, event: &PipelineEvent<'_>, preview_chars: usize) -> Result<()> {
    match event {
        PipelineEvent::Started { request } => {
            writeln!(out, "Agent: Analyzing research request ({})...", request.id)?;
        }
        PipelineEvent::Decomposed { breakdown } => {
            writeln!(out, "\nTopic: {}", breakdown.topic)?;
            writeln!(
                out,
                "Breaking into {} subtopics: {}",
                breakdown.subtopics.len(),
                breakdown.subtopics.as_slice().join(", ")
            )?;
        }
        PipelineEvent::Researching {
            position,
            total,
            subtopic,
        } => {
            writeln!(out, "\n[{position}/{total}] Researching: {subtopic}")?;
        }
        PipelineEvent::NoteSaved { note, .. } => {
            writeln!(out, "✓ Saved to: {}", note.path.display())?;
            if preview_chars > 0 {
                writeln!(
                    out,
                    "\nFindings preview:\n{}\n",
                    preview(&note.findings, preview_chars)
                )?;
            }
        }
        PipelineEvent::Synthesizing { notes } => {
            writeln!(out, "\n=== Generating Report from {notes} notes ===")?;
        }
        PipelineEvent::ReportSaved { report } => {
            writeln!(out, "✓ Research complete! Report saved to: {}", report.path.display())?;
        }
    }
    Ok(())
}

/// First `max_chars` characters, with `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}
