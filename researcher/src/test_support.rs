//! Test-only helpers: a scripted chat client and a scratch workspace.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};

use crate::core::citations::extract_urls;
use crate::core::slug::note_file_name;
use crate::core::types::ResearchNote;
use crate::io::client::{ChatClient, ChatRequest, ChatResponse};
use crate::io::config::{ResearchPaths, ResearcherConfig};
use crate::io::session_log::SessionLog;

/// Deterministic timestamp (2024-03-09 14:05:07).
pub fn fixed_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|d| d.and_hms_opt(14, 5, 7))
        .expect("valid fixed time")
}

/// Build an in-memory note as if it had been written under `notes/<request_id>/`.
pub fn note(request_id: &str, position: usize, subtopic: &str, findings: &str) -> ResearchNote {
    ResearchNote {
        request_id: request_id.to_string(),
        position,
        subtopic: subtopic.to_string(),
        findings: findings.to_string(),
        sources: extract_urls(findings),
        created_at: fixed_time(),
        path: PathBuf::from("notes")
            .join(request_id)
            .join(note_file_name(position, subtopic)),
    }
}

/// One scripted reply: either content or a transport error message.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Content(String),
    Error(String),
}

impl ScriptedReply {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content(text.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

/// Chat client that replays queued replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: RefCell<VecDeque<ScriptedReply>>,
    requests: RefCell<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl ChatClient for ScriptedClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests.borrow_mut().push(request.clone());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted client has no reply for {}", request.stage))?;
        match reply {
            ScriptedReply::Content(content) => Ok(ChatResponse {
                content,
                web_searches: u32::from(request.web_search),
            }),
            ScriptedReply::Error(message) => Err(anyhow!(message)),
        }
    }
}

/// JSON decomposition reply for `subtopics`.
pub fn breakdown_reply(topic: &str, subtopics: &[&str]) -> ScriptedReply {
    let value = serde_json::json!({ "topic": topic, "subtopics": subtopics });
    ScriptedReply::content(format!("```json\n{value}\n```"))
}

/// Scratch workspace with default config and a session log.
pub struct TestWorkspace {
    _temp: tempfile::TempDir,
    pub config: ResearcherConfig,
    pub paths: ResearchPaths,
    pub log: SessionLog,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let config = ResearcherConfig::default();
        let paths = config.paths(temp.path());
        paths.create_all()?;
        let log = SessionLog::create(&paths.logs_dir, fixed_time())?;
        Ok(Self {
            _temp: temp,
            config,
            paths,
            log,
        })
    }

    /// All markdown files under `dir`, recursively, sorted.
    pub fn markdown_files(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_markdown(dir, &mut found);
        found.sort();
        found
    }

    pub fn note_files(&self) -> Vec<PathBuf> {
        Self::markdown_files(&self.paths.notes_dir)
    }

    pub fn report_files(&self) -> Vec<PathBuf> {
        Self::markdown_files(&self.paths.reports_dir)
    }

    pub fn transcript(&self) -> String {
        std::fs::read_to_string(self.log.transcript_path()).unwrap_or_default()
    }
}

fn collect_markdown(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_markdown(&path, found);
        } else if path.extension().is_some_and(|ext| ext == "md") {
            found.push(path);
        }
    }
}
