//! Session transcript under `<logs_dir>/session_<timestamp>/transcript.txt`.
//!
//! The transcript is a product artifact: it is always written, independent of
//! `RUST_LOG`. Entries are only ever appended.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDateTime};

use crate::core::slug::unique_id;
use crate::core::stage::Transition;

/// One transcript entry.
#[derive(Debug, Clone)]
pub enum LogEntry<'a> {
    /// Free-form line, e.g. user input or console output.
    Message(&'a str),
    /// Pipeline stage change for a request.
    Stage {
        request_id: &'a str,
        transition: Transition,
        detail: Option<&'a str>,
    },
    /// Raw prompt/reply pair sent to the remote model.
    Exchange {
        request_id: &'a str,
        stage: &'a str,
        prompt: &'a str,
        response: Result<&'a str, &'a str>,
    },
}

#[derive(Debug, Clone)]
pub struct SessionLog {
    dir: PathBuf,
    transcript_path: PathBuf,
}

impl SessionLog {
    /// Create a fresh session directory under `logs_dir`.
    pub fn create(logs_dir: &Path, started_at: NaiveDateTime) -> Result<Self> {
        fs::create_dir_all(logs_dir)
            .with_context(|| format!("create logs dir {}", logs_dir.display()))?;
        let base = format!("session_{}", started_at.format("%Y%m%d_%H%M%S"));
        let name = unique_id(&base, |name| logs_dir.join(name).exists())
            .ok_or_else(|| anyhow!("no free session directory for {base}"))?;
        let dir = logs_dir.join(name);
        fs::create_dir(&dir).with_context(|| format!("create session dir {}", dir.display()))?;
        Ok(Self {
            transcript_path: dir.join("transcript.txt"),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn transcript_path(&self) -> &Path {
        &self.transcript_path
    }

    pub fn append(&self, entry: &LogEntry<'_>) -> Result<()> {
        self.append_at(entry, Local::now().naive_local())
    }

    fn append_at(&self, entry: &LogEntry<'_>, at: NaiveDateTime) -> Result<()> {
        let text = render_entry(entry, at);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.transcript_path)
            .with_context(|| format!("open {}", self.transcript_path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("append {}", self.transcript_path.display()))
    }
}

fn render_entry(entry: &LogEntry<'_>, at: NaiveDateTime) -> String {
    let stamp = at.format("%H:%M:%S");
    match entry {
        LogEntry::Message(text) => format!("{text}\n"),
        LogEntry::Stage {
            request_id,
            transition,
            detail,
        } => {
            let mut line = format!(
                "[{stamp}] [{request_id}] stage {} -> {}",
                transition.from, transition.to
            );
            if let Some(detail) = detail {
                line.push_str(&format!(": {detail}"));
            }
            line.push('\n');
            line
        }
        LogEntry::Exchange {
            request_id,
            stage,
            prompt,
            response,
        } => {
            let (label, body) = match response {
                Ok(body) => ("response", body),
                Err(body) => ("error", body),
            };
            format!(
                "[{stamp}] [{request_id}] {stage} request\n{prompt}\n[{stamp}] [{request_id}] {stage} {label}\n{body}\n"
            )
        }
    }
}
