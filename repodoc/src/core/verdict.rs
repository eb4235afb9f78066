//! Structured-reply extraction for evaluation and capability-selection replies.
//!
//! Oracle replies are free text that should embed a JSON block. This module is
//! the single boundary that turns such text into a [`CompletenessVerdict`] or a
//! list of [`ProposedCall`]s. When no structure can be recovered the evaluation
//! path falls back to a deterministic verdict derived only from the iteration
//! count and the [`ConvergencePolicy`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::policy::ConvergencePolicy;

/// Missing-aspect label used when a structured block was present but unreadable.
pub const UNABLE_TO_ASSESS: &str = "unable to assess";

const DEFAULT_PARSED_CONFIDENCE: f64 = 0.5;

/// A capability call proposed by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedCall {
    pub tool: String,
    /// Raw arguments as sent by the oracle. Usually an object; validated at dispatch.
    pub args: Value,
    pub reason: Option<String>,
}

impl ProposedCall {
    pub fn new(tool: impl Into<String>, args: Map<String, Value>, reason: Option<&str>) -> Self {
        Self {
            tool: tool.into(),
            args: Value::Object(args),
            reason: reason.map(str::to_string),
        }
    }
}

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Parsed from a structured block in the reply.
    Parsed,
    /// No structured block was found; fallback applied.
    NoStructuredBlock,
    /// A block was found but could not be decoded; fallback applied.
    MalformedBlock,
}

/// Normalized evaluator output.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessVerdict {
    pub is_complete: bool,
    pub confidence: f64,
    pub missing_aspects: Vec<String>,
    pub proposed_calls: Vec<ProposedCall>,
    pub analysis: Option<String>,
    pub source: VerdictSource,
}

impl CompletenessVerdict {
    /// Deterministic verdict used when the reply carries no usable structure.
    pub fn fallback(
        iteration_count: u32,
        policy: &ConvergencePolicy,
        source: VerdictSource,
    ) -> Self {
        let missing_aspects = match source {
            VerdictSource::MalformedBlock => vec![UNABLE_TO_ASSESS.to_string()],
            _ => Vec::new(),
        };
        Self {
            is_complete: policy.fallback_complete(iteration_count),
            confidence: policy.fallback_confidence,
            missing_aspects,
            proposed_calls: Vec::new(),
            analysis: None,
            source,
        }
    }
}

/// Parse an evaluation reply, applying the fallback when no structure is recoverable.
pub fn parse_verdict(
    reply: &str,
    iteration_count: u32,
    policy: &ConvergencePolicy,
) -> CompletenessVerdict {
    let Some(block) = extract_structured_block(reply) else {
        return CompletenessVerdict::fallback(
            iteration_count,
            policy,
            VerdictSource::NoStructuredBlock,
        );
    };
    let object = match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(object)) => object,
        _ => {
            return CompletenessVerdict::fallback(
                iteration_count,
                policy,
                VerdictSource::MalformedBlock,
            );
        }
    };

    CompletenessVerdict {
        is_complete: object.get("is_complete").and_then(as_bool).unwrap_or(false),
        confidence: object
            .get("confidence_score")
            .or_else(|| object.get("confidence"))
            .and_then(as_f64)
            .unwrap_or(DEFAULT_PARSED_CONFIDENCE)
            .clamp(0.0, 1.0),
        missing_aspects: object
            .get("missing_parts")
            .or_else(|| object.get("missing_aspects"))
            .map(as_labels)
            .unwrap_or_default(),
        proposed_calls: object
            .get("suggested_tools")
            .or_else(|| object.get("tool_calls"))
            .map(as_calls)
            .unwrap_or_default(),
        analysis: object
            .get("analysis")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        source: VerdictSource::Parsed,
    }
}

/// Parse a capability-selection reply. Returns `None` when no structure is recoverable.
///
/// Accepts `{"tool_calls": [...]}` or a bare array of calls.
pub fn parse_selection(reply: &str) -> Option<Vec<ProposedCall>> {
    let block = fenced_block(reply).or_else(|| {
        let array_first = match (reply.find('['), reply.find('{')) {
            (Some(bracket), Some(brace)) => bracket < brace,
            (Some(_), None) => true,
            _ => false,
        };
        if array_first {
            span_between(reply, '[', ']')
        } else {
            span_between(reply, '{', '}')
        }
    })?;
    match serde_json::from_str::<Value>(block).ok()? {
        Value::Object(object) => object
            .get("tool_calls")
            .or_else(|| object.get("suggested_tools"))
            .map(as_calls),
        array @ Value::Array(_) => Some(as_calls(&array)),
        _ => None,
    }
}

/// Locate the embedded JSON object in free text.
///
/// Prefers a fenced code block; otherwise spans from the first `{` to the last `}`.
pub fn extract_structured_block(reply: &str) -> Option<&str> {
    fenced_block(reply).or_else(|| span_between(reply, '{', '}'))
}

fn fenced_block(reply: &str) -> Option<&str> {
    static FENCED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"```(?:json|JSON)?\s*([\{\[][\s\S]*?[\}\]])\s*```").expect("valid regex")
    });
    FENCED_RE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn span_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn as_labels(value: &Value) -> Vec<String> {
    let label = |item: &Value| match item {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    match value {
        Value::Array(items) => items
            .iter()
            .map(label)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn as_calls(value: &Value) -> Vec<ProposedCall> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items.iter().filter_map(as_call).collect()
}

fn as_call(item: &Value) -> Option<ProposedCall> {
    let object = item.as_object()?;
    let tool = ["tool", "name", "tool_name"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))?
        .trim()
        .to_string();
    if tool.is_empty() {
        return None;
    }
    let args = object
        .get("args")
        .or_else(|| object.get("arguments"))
        .cloned()
        .unwrap_or(Value::Null);
    let reason = object
        .get("reason")
        .or_else(|| object.get("rationale"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(ProposedCall { tool, args, reason })
}
