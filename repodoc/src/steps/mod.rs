//! The three steps of the refinement loop.
//!
//! Steps read what they need from the run and return values; they never hold
//! or mutate the run state. The engine applies their outputs.

pub mod dispatcher;
pub mod evaluator;
pub mod synthesizer;

use thiserror::Error;

use crate::core::state::{FailureKind, RunFailure};

/// Why an oracle step could not produce a result.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("render prompt: {0:#}")]
    Prompt(anyhow::Error),
    #[error("{0:#}")]
    Oracle(anyhow::Error),
    #[error("{0}")]
    UnusableReply(String),
}

impl StepError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Prompt(_) => FailureKind::Internal,
            Self::Oracle(_) => FailureKind::OracleUnreachable,
            Self::UnusableReply(_) => FailureKind::UnusableReply,
        }
    }

    pub fn into_failure(self) -> RunFailure {
        RunFailure::new(self.kind(), self.to_string())
    }
}
