//! Run configuration, stored as TOML (default file name `repodoc.toml`).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::{
    ConvergencePolicy, DEFAULT_FALLBACK_COMPLETE_AFTER, DEFAULT_FALLBACK_CONFIDENCE,
};

pub const DEFAULT_CONFIG_FILE: &str = "repodoc.toml";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Top-level configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepodocConfig {
    pub agent: AgentConfig,
    pub oracle: OracleConfig,
    pub output: OutputConfig,
}

/// Loop bounds and truncation limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard ceiling on synthesis calls.
    pub max_iterations: u32,
    pub max_tool_calls_per_iteration: usize,
    /// Iteration from which an unparseable evaluation counts as complete.
    pub fallback_complete_after: u32,
    /// Confidence assigned by the fallback verdict. Must lie in `[0, 1]`.
    pub fallback_confidence: f64,
    /// Characters of each capability result kept in the audit history.
    pub record_result_chars: usize,
    /// Characters of each capability result passed to the next synthesis.
    pub evidence_result_chars: usize,
    pub prompt_budget_bytes: usize,
    /// Characters of the artifact shown when asking the oracle to pick capabilities.
    pub selection_artifact_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_tool_calls_per_iteration: 5,
            fallback_complete_after: DEFAULT_FALLBACK_COMPLETE_AFTER,
            fallback_confidence: DEFAULT_FALLBACK_CONFIDENCE,
            record_result_chars: 2_000,
            evidence_result_chars: 12_000,
            prompt_budget_bytes: 120_000,
            selection_artifact_chars: 2_000,
        }
    }
}

impl AgentConfig {
    pub fn policy(&self) -> ConvergencePolicy {
        ConvergencePolicy {
            max_iterations: self.max_iterations,
            fallback_complete_after: self.fallback_complete_after,
            fallback_confidence: self.fallback_confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    /// Spawn a local agent CLI and pipe the prompt to it.
    Command,
    /// OpenAI-compatible chat completions over HTTP.
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub backend: OracleBackend,
    /// argv for the `command` backend; the prompt is written to stdin.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    pub model: String,
    pub temperature: f64,
    /// Overrides `OPENAI_BASE_URL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::Command,
            command: ["codex", "exec", "--skip-git-repo-check", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 600,
            output_limit_bytes: 1_000_000,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            base_url: None,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Config value, then `OPENAI_BASE_URL`, then the public endpoint.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .or_else(|| env::var(BASE_URL_ENV).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Short description used in reports.
    pub fn label(&self) -> String {
        match self.backend {
            OracleBackend::Command => format!("command: {}", self.command.join(" ")),
            OracleBackend::Openai => format!("openai: {}", self.model),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Relative paths resolve against the repository root.
    pub output_dir: PathBuf,
    pub filename: String,
    /// Write every artifact version under `intermediate/`.
    pub save_intermediate: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("repodoc-output"),
            filename: "requirements.md".to_string(),
            save_intermediate: true,
        }
    }
}

impl OutputConfig {
    pub fn resolve_dir(&self, repo_root: &Path) -> PathBuf {
        if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            repo_root.join(&self.output_dir)
        }
    }
}

impl RepodocConfig {
    pub fn validate(&self) -> Result<()> {
        let agent = &self.agent;
        if agent.max_iterations == 0 {
            return Err(anyhow!("agent.max_iterations must be > 0"));
        }
        if agent.max_tool_calls_per_iteration == 0 {
            return Err(anyhow!("agent.max_tool_calls_per_iteration must be > 0"));
        }
        if !(0.0..=1.0).contains(&agent.fallback_confidence) {
            return Err(anyhow!("agent.fallback_confidence must lie in [0, 1]"));
        }
        if agent.record_result_chars == 0 || agent.evidence_result_chars == 0 {
            return Err(anyhow!("agent result limits must be > 0"));
        }
        if agent.prompt_budget_bytes == 0 {
            return Err(anyhow!("agent.prompt_budget_bytes must be > 0"));
        }
        if self.oracle.backend == OracleBackend::Command
            && self.oracle.command.first().is_none_or(|p| p.trim().is_empty())
        {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.output_limit_bytes == 0 {
            return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(anyhow!("oracle.temperature must lie in [0, 2]"));
        }
        if self.oracle.backend == OracleBackend::Openai && self.oracle.model.trim().is_empty() {
            return Err(anyhow!("oracle.model must be set for the openai backend"));
        }
        let filename = self.output.filename.trim();
        if filename.is_empty() || filename.contains(['/', '\\']) {
            return Err(anyhow!("output.filename must be a plain file name"));
        }
        Ok(())
    }
}

/// Load config from `path`.
///
/// `None`, or a path that does not exist, yields validated defaults.
pub fn load_config(path: Option<&Path>) -> Result<RepodocConfig> {
    let Some(path) = path.filter(|p| p.exists()) else {
        let cfg = RepodocConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    };
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RepodocConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RepodocConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
