//! Note store: one write-once markdown file per researched subtopic.
//!
//! Notes live under `<notes_dir>/<request-id>/`, so a request can only ever
//! see its own notes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use tracing::debug;

use crate::core::citations::extract_urls;
use crate::core::slug::note_file_name;
use crate::core::types::ResearchNote;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Fields needed to persist one note.
#[derive(Debug, Clone)]
pub struct NoteDraft<'a> {
    pub request_id: &'a str,
    pub position: usize,
    pub subtopic: &'a str,
    pub findings: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NoteStore {
    notes_dir: PathBuf,
}

impl NoteStore {
    pub fn new(notes_dir: impl Into<PathBuf>) -> Self {
        Self {
            notes_dir: notes_dir.into(),
        }
    }

    /// Directory holding the notes of one request.
    pub fn request_dir(&self, request_id: &str) -> PathBuf {
        self.notes_dir.join(request_id)
    }

    /// Whether any artifact already exists for `request_id`.
    pub fn request_exists(&self, request_id: &str) -> bool {
        self.request_dir(request_id).exists()
    }

    /// Write a note atomically and return it.
    ///
    /// Refuses to overwrite an existing note: notes are write-once.
    pub fn write(&self, draft: &NoteDraft<'_>) -> Result<ResearchNote> {
        let findings = draft.findings.trim();
        if findings.is_empty() {
            return Err(anyhow!("refusing to write empty note"));
        }
        let dir = self.request_dir(draft.request_id);
        let file_name = note_file_name(draft.position, draft.subtopic);
        let path = dir.join(&file_name);
        if path.exists() {
            return Err(anyhow!("note already exists {}", path.display()));
        }

        let contents = render_note(draft.subtopic, findings, draft.created_at);
        fs::create_dir_all(&self.notes_dir)
            .with_context(|| format!("create notes dir {}", self.notes_dir.display()))?;
        // Staged next to the request dirs so a failed write creates no request dir.
        let staged = self
            .notes_dir
            .join(format!(".{}_{file_name}.tmp", draft.request_id));
        write_staged(&staged, &dir, &path, &contents)?;
        debug!(path = %path.display(), bytes = contents.len(), "note written");

        Ok(ResearchNote {
            request_id: draft.request_id.to_string(),
            position: draft.position,
            subtopic: draft.subtopic.to_string(),
            findings: findings.to_string(),
            sources: extract_urls(findings),
            created_at: draft.created_at,
            path,
        })
    }
}

fn render_note(subtopic: &str, findings: &str, created_at: NaiveDateTime) -> String {
    format!(
        "# {subtopic}\n\n*Researched: {}*\n\n{findings}\n",
        created_at.format(TIMESTAMP_FORMAT)
    )
}

/// Write `contents` to `staged`, then move it into `dir` as `path`.
///
/// On failure the staged file is removed, and so is `dir` when this call
/// created it.
fn write_staged(staged: &Path, dir: &Path, path: &Path, contents: &str) -> Result<()> {
    fs::write(staged, contents)
        .with_context(|| format!("write temp note {}", staged.display()))?;

    let created_dir = !dir.exists();
    let moved = fs::create_dir_all(dir).and_then(|()| fs::rename(staged, path));
    if let Err(err) = moved {
        let _ = fs::remove_file(staged);
        if created_dir {
            let _ = fs::remove_dir(dir);
        }
        return Err(err).with_context(|| format!("save note {}", path.display()));
    }
    Ok(())
}
