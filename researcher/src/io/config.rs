//! Researcher configuration stored in `researcher.toml` at the workspace root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// File name of the config, relative to the workspace root.
pub const CONFIG_FILE: &str = "researcher.toml";

/// Researcher configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to the defaults
/// below, which match the hosted Moonshot endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResearcherConfig {
    /// Model identifier sent with every request.
    pub model: String,

    /// OpenAI-compatible API base URL (without `/chat/completions`).
    pub base_url: String,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,

    /// Sampling temperature for all three stages.
    pub temperature: f32,

    /// Upper bound on `$web_search` tool round-trips within one request.
    pub max_tool_turns: u32,

    /// Total HTTP timeout per request, covering web-search turns and long
    /// synthesis replies.
    pub request_timeout_secs: u64,

    /// Byte budget for the synthesis prompt's combined notes.
    pub prompt_budget_bytes: usize,

    /// Characters of findings echoed to the console after each note.
    pub preview_chars: usize,

    pub notes_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for ResearcherConfig {
    fn default() -> Self {
        Self {
            model: "moonshot-v1-auto".to_string(),
            base_url: "https://api.moonshot.cn/v1".to_string(),
            api_key_env: "MOONSHOT_API_KEY".to_string(),
            temperature: 0.3,
            max_tool_turns: 5,
            request_timeout_secs: 600,
            prompt_budget_bytes: 60_000,
            preview_chars: 200,
            notes_dir: PathBuf::from("files/research_notes"),
            reports_dir: PathBuf::from("files/reports"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl ResearcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(anyhow!("base_url must be an http(s) URL"));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(anyhow!("api_key_env must be non-empty"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(anyhow!("temperature must be within 0.0..=1.0"));
        }
        if self.max_tool_turns == 0 {
            return Err(anyhow!("max_tool_turns must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        for (name, dir) in [
            ("notes_dir", &self.notes_dir),
            ("reports_dir", &self.reports_dir),
            ("logs_dir", &self.logs_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(anyhow!("{name} must be non-empty"));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve the configured directories against `root`.
    pub fn paths(&self, root: &Path) -> ResearchPaths {
        ResearchPaths {
            notes_dir: root.join(&self.notes_dir),
            reports_dir: root.join(&self.reports_dir),
            logs_dir: root.join(&self.logs_dir),
        }
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        let key = std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "{} not found (set it in a .env file or export it in your shell)",
                    self.api_key_env
                )
            })?;
        Ok(key)
    }
}

/// Absolute artifact directories for a workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchPaths {
    pub notes_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl ResearchPaths {
    pub fn create_all(&self) -> Result<()> {
        for dir in [&self.notes_dir, &self.reports_dir, &self.logs_dir] {
            fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ResearcherConfig::default()`.
pub fn load_config(path: &Path) -> Result<ResearcherConfig> {
    if !path.exists() {
        let cfg = ResearcherConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ResearcherConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ResearcherConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
