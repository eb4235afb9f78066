//! Oracle abstraction for text generation.
//!
//! The [`Oracle`] trait decouples the steps from the actual backend. Two
//! backends ship: [`CommandOracle`] pipes the prompt to a local agent CLI and
//! [`OpenAiOracle`] calls an OpenAI-compatible chat-completions endpoint. Tests
//! use scripted oracles (see `test_support`) that return canned replies.
//!
//! Any `Err` returned by an oracle means the oracle is unreachable for that
//! call. Callers decide whether that is fatal.

use std::env;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::config::{API_KEY_ENV, OracleBackend, OracleConfig};
use crate::io::process::run_child;

/// Which contract a request follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleMode {
    /// Produce or revise the artifact. Free-form reply.
    Synthesize,
    /// Judge completeness. Reply embeds a JSON verdict.
    Evaluate,
    /// Choose capability calls. Reply embeds a JSON list.
    SelectCapabilities,
}

impl fmt::Display for OracleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Synthesize => "synthesize",
            Self::Evaluate => "evaluate",
            Self::SelectCapabilities => "select_capabilities",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub mode: OracleMode,
    pub system: String,
    pub prompt: String,
}

pub trait Oracle {
    fn complete(&self, request: &OracleRequest) -> Result<String>;

    /// Short description used in logs and reports.
    fn label(&self) -> String;
}

/// Oracle backed by a local agent CLI reading the prompt from stdin.
pub struct CommandOracle {
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandOracle {
    pub fn new(argv: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            argv,
            timeout,
            output_limit_bytes,
        }
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(mode = %request.mode, prompt_bytes = request.prompt.len()))]
    fn complete(&self, request: &OracleRequest) -> Result<String> {
        info!(program = %self.argv.first().map(String::as_str).unwrap_or(""), "invoking command oracle");
        let input = format!("{}\n\n{}", request.system.trim_end(), request.prompt);
        let output = run_child(
            &self.argv,
            Some(input.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run oracle command")?;

        if output.timed_out {
            bail!("oracle command timed out after {}s", self.timeout.as_secs());
        }
        if !output.status.success() {
            bail!(
                "oracle command exited with {:?}: {}",
                output.status.code(),
                output.stderr_tail(5)
            );
        }
        if output.stdout_dropped > 0 {
            warn!(dropped = output.stdout_dropped, "oracle reply truncated");
        }
        let reply = output.stdout_text();
        if reply.trim().is_empty() {
            bail!("oracle command produced no output");
        }
        debug!(reply_bytes = reply.len(), "command oracle replied");
        Ok(reply)
    }

    fn label(&self) -> String {
        format!("command: {}", self.argv.join(" "))
    }
}

/// Oracle backed by an OpenAI-compatible chat-completions API.
pub struct OpenAiOracle {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiOracle {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature,
        })
    }

    /// Build from config, reading the API key from `OPENAI_API_KEY`.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("{API_KEY_ENV} is not set"))?;
        Self::new(
            config.resolved_base_url(),
            api_key,
            config.model.clone(),
            config.temperature,
            config.timeout(),
        )
    }
}

impl Oracle for OpenAiOracle {
    #[instrument(skip_all, fields(mode = %request.mode, model = %self.model))]
    fn complete(&self, request: &OracleRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        info!(url = %url, "invoking chat completions");
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.temperature,
        };
        let response: ChatResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .context("chat completions returned an error status")?
            .json()
            .context("decode chat completions response")?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("chat completions response has no content"))?;
        debug!(reply_bytes = reply.len(), "chat completions replied");
        Ok(reply)
    }

    fn label(&self) -> String {
        format!("openai: {}", self.model)
    }
}

/// Construct the configured backend.
pub fn build_oracle(config: &OracleConfig) -> Result<Box<dyn Oracle>> {
    match config.backend {
        OracleBackend::Command => Ok(Box::new(CommandOracle::new(
            config.command.clone(),
            config.timeout(),
            config.output_limit_bytes,
        ))),
        OracleBackend::Openai => Ok(Box::new(OpenAiOracle::from_config(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> OracleRequest {
        OracleRequest {
            mode: OracleMode::Synthesize,
            system: "system".to_string(),
            prompt: prompt.to_string(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn command_oracle_returns_stdout() {
        let oracle = CommandOracle::new(
            vec!["cat".to_string()],
            Duration::from_secs(10),
            10_000,
        );
        let reply = oracle.complete(&request("write the doc")).expect("reply");
        assert_eq!(reply, "system\n\nwrite the doc");
    }

    #[cfg(unix)]
    #[test]
    fn command_oracle_fails_on_nonzero_exit_or_empty_output() {
        let failing = CommandOracle::new(
            vec!["sh".to_string(), "-c".to_string(), "cat >/dev/null; echo boom >&2; exit 2".to_string()],
            Duration::from_secs(10),
            10_000,
        );
        let err = failing.complete(&request("x")).expect_err("exit 2");
        assert!(format!("{err:#}").contains("boom"));

        let silent = CommandOracle::new(vec!["true".to_string()], Duration::from_secs(10), 10_000);
        assert!(silent.complete(&request("x")).is_err());
    }

    #[test]
    fn command_oracle_reports_spawn_failure() {
        let oracle = CommandOracle::new(
            vec!["repodoc-no-such-binary".to_string()],
            Duration::from_secs(1),
            100,
        );
        assert!(oracle.complete(&request("x")).is_err());
    }

    #[test]
    fn build_oracle_uses_command_backend_by_default() {
        let oracle = build_oracle(&OracleConfig::default()).expect("oracle");
        assert!(oracle.label().starts_with("command: codex exec"));
    }

    #[test]
    fn openai_oracle_reports_unreachable_endpoint() {
        let oracle = OpenAiOracle::new(
            "http://127.0.0.1:9".to_string(),
            "key".to_string(),
            "gpt-test".to_string(),
            0.3,
            Duration::from_secs(2),
        )
        .expect("client");
        let err = oracle.complete(&request("x")).expect_err("unreachable");
        assert!(format!("{err:#}").contains("chat/completions"));
    }
}
