//! The run record threaded through every step of a run.
//!
//! [`RunState`] is owned by the engine driving the run. Steps receive shared
//! references to the fields they need and return values; only the engine
//! applies those values (see `engine::Engine`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::machine::Phase;
use crate::core::verdict::ProposedCall;

/// Seed evidence gathered once before the first synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEvidence {
    /// Rendered markdown summary handed to the oracle.
    pub summary: String,
    /// Directory tree rendered at seed time (reused by capability selection).
    pub directory_tree: String,
    /// Project files found at the repository root.
    pub project_files: Vec<String>,
    /// Most common source extension (with leading dot), if any source file was found.
    pub dominant_extension: Option<String>,
}

/// One resolved capability invocation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
    pub name: String,
    pub arguments: Map<String, Value>,
    /// Result text (or failure description), truncated for the audit trail.
    pub result: String,
    pub success: bool,
}

/// Audit entry for one dispatcher pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub action: String,
    pub findings: String,
    pub calls: Vec<CapabilityCall>,
}

impl IterationRecord {
    pub fn succeeded(&self) -> usize {
        self.calls.iter().filter(|call| call.success).count()
    }

    pub fn failed(&self) -> usize {
        self.calls.len() - self.succeeded()
    }
}

/// Classification of a fatal run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    #[error("fatal input error")]
    FatalInput,
    #[error("oracle unreachable")]
    OracleUnreachable,
    /// The oracle answered, but the reply cannot be used.
    #[error("unusable oracle reply")]
    UnusableReply,
    #[error("persistence error")]
    Persistence,
    #[error("cancelled")]
    Cancelled,
    /// A prompt failed to render or the transition table rejected a step.
    #[error("internal error")]
    Internal,
}

/// Terminal error description stored on the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RunFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// User-facing run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// The single mutable record for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub repo_path: PathBuf,
    /// Set once during `INIT`, never modified afterwards.
    pub seed: SeedEvidence,
    pub artifact: String,
    /// One entry per completed synthesis, append-only.
    pub artifact_versions: Vec<String>,
    pub is_complete: bool,
    /// True when the iteration ceiling, not the oracle, ended exploration.
    pub forced_completion: bool,
    /// `None` until the first evaluation.
    pub confidence: Option<f64>,
    pub missing_aspects: Vec<String>,
    pub iteration_count: u32,
    pub max_iterations: u32,
    /// Calls proposed by the latest verdict, consumed by the next dispatch.
    pub pending_proposals: Vec<ProposedCall>,
    /// Evidence bundle from the latest dispatch, consumed by the next synthesis.
    pub pending_evidence: Option<String>,
    pub history: Vec<IterationRecord>,
    pub phase: Phase,
    pub error: Option<RunFailure>,
}

impl RunState {
    pub fn new(repo_path: impl Into<PathBuf>, max_iterations: u32) -> Self {
        Self {
            repo_path: repo_path.into(),
            seed: SeedEvidence::default(),
            artifact: String::new(),
            artifact_versions: Vec::new(),
            is_complete: false,
            forced_completion: false,
            confidence: None,
            missing_aspects: Vec::new(),
            iteration_count: 0,
            max_iterations,
            pending_proposals: Vec::new(),
            pending_evidence: None,
            history: Vec::new(),
            phase: Phase::Init,
            error: None,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self.phase {
            Phase::Done => RunStatus::Completed,
            Phase::Error => RunStatus::Error,
            _ => RunStatus::Running,
        }
    }

    pub fn at_ceiling(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }

    /// Check the structural invariants that must hold at every observation point.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.iteration_count > self.max_iterations {
            errors.push(format!(
                "iteration_count {} exceeds max_iterations {}",
                self.iteration_count, self.max_iterations
            ));
        }
        if self.artifact_versions.len() != self.iteration_count as usize {
            errors.push(format!(
                "{} artifact versions recorded for {} iterations",
                self.artifact_versions.len(),
                self.iteration_count
            ));
        }
        if let Some(confidence) = self.confidence
            && !(0.0..=1.0).contains(&confidence)
        {
            errors.push(format!("confidence {confidence} outside [0, 1]"));
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_in_init_with_no_confidence() {
        let state = RunState::new("/repo", 4);
        assert_eq!(state.phase, Phase::Init);
        assert_eq!(state.status(), RunStatus::Running);
        assert_eq!(state.confidence, None);
        assert!(state.invariant_violations().is_empty());
    }

    #[test]
    fn invariant_violations_report_version_mismatch() {
        let mut state = RunState::new("/repo", 2);
        state.iteration_count = 1;
        let errors = state.invariant_violations();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("0 artifact versions"));
    }

    #[test]
    fn iteration_record_counts_outcomes() {
        let call = |success| CapabilityCall {
            name: "search_code".to_string(),
            arguments: Map::new(),
            result: String::new(),
            success,
        };
        let record = IterationRecord {
            iteration: 1,
            action: "a".to_string(),
            findings: "f".to_string(),
            calls: vec![call(true), call(false), call(true)],
        };
        assert_eq!(record.succeeded(), 2);
        assert_eq!(record.failed(), 1);
    }

    #[test]
    fn run_failure_display_includes_kind() {
        let failure = RunFailure::new(FailureKind::Persistence, "disk full");
        assert_eq!(failure.to_string(), "persistence error: disk full");
    }
}
