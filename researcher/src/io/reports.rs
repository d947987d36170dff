//! Report store: one write-once markdown file per completed request.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use tracing::debug;

use crate::core::citations::merge_sources;
use crate::core::types::{Report, ResearchNote};

#[derive(Debug, Clone)]
pub struct ReportStore {
    reports_dir: PathBuf,
}

impl ReportStore {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn report_path(&self, request_id: &str) -> PathBuf {
        self.reports_dir.join(format!("{request_id}_report.md"))
    }

    pub fn report_exists(&self, request_id: &str) -> bool {
        self.report_path(request_id).exists()
    }

    /// Persist the synthesized text together with its note references.
    pub fn write(
        &self,
        request_id: &str,
        topic: &str,
        content: &str,
        notes: &[ResearchNote],
        generated_at: NaiveDateTime,
    ) -> Result<Report> {
        fs::create_dir_all(&self.reports_dir)
            .with_context(|| format!("create report dir {}", self.reports_dir.display()))?;
        let path = self.report_path(request_id);
        if path.exists() {
            return Err(anyhow!("report already exists {}", path.display()));
        }

        let body = render_report(topic, content, notes, generated_at);
        write_atomic(&path, &body)?;
        debug!(path = %path.display(), notes = notes.len(), "report written");

        Ok(Report {
            request_id: request_id.to_string(),
            topic: topic.to_string(),
            note_paths: notes.iter().map(|n| n.path.clone()).collect(),
            content: content.to_string(),
            generated_at,
            path,
        })
    }
}

fn render_report(
    topic: &str,
    content: &str,
    notes: &[ResearchNote],
    generated_at: NaiveDateTime,
) -> String {
    let mut buf = format!(
        "# Research Report: {topic}\n\n*Generated: {}*\n\n---\n\n{}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S"),
        content.trim()
    );

    buf.push_str("\n---\n\n## Research notes\n\n");
    for note in notes {
        buf.push_str(&format!(
            "{}. {} (`{}`)\n",
            note.position,
            note.subtopic,
            note.path.display()
        ));
    }

    let sources = merge_sources(notes.iter().map(|n| n.sources.as_slice()));
    if !sources.is_empty() {
        buf.push_str("\n## Sources\n\n");
        for url in sources {
            buf.push_str(&format!("- {url}\n"));
        }
    }
    buf
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("md.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp report {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("replace report {}", path.display()));
    }
    Ok(())
}
