//! Control-flow state machine for a run.
//!
//! Phases and the events that move between them are enumerated explicitly; the
//! transition table in [`transition`] is the only place that decides the next
//! phase. Guard evaluation for `EVALUATE` lives in `core::policy`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Run phase. `Init` is the single entry phase; `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    Synthesize,
    Evaluate,
    Dispatch,
    Persist,
    Done,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Synthesize => "SYNTHESIZE",
            Self::Evaluate => "EVALUATE",
            Self::Dispatch => "DISPATCH",
            Self::Persist => "PERSIST",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the step executed in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Seed evidence collected.
    Seeded,
    /// A new artifact version was produced.
    Synthesized,
    /// Evaluation finished and the run has converged (oracle verdict or ceiling).
    Converged,
    /// Evaluation finished and more evidence is needed.
    NeedsEvidence,
    /// A dispatcher batch finished (regardless of per-call failures).
    Dispatched,
    /// Final outputs were written.
    Persisted,
    /// The step failed fatally.
    Failed,
    /// External cancellation was observed between steps.
    Cancelled,
}

/// A `(phase, event)` pair with no entry in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no transition from {phase} on {event:?}")]
pub struct InvalidTransition {
    pub phase: Phase,
    pub event: Event,
}

/// Transition table.
pub fn transition(phase: Phase, event: Event) -> Result<Phase, InvalidTransition> {
    use Event as E;
    use Phase as P;

    let next = match (phase, event) {
        (P::Done | P::Error, _) => None,
        (_, E::Cancelled) => Some(P::Error),
        (P::Init, E::Seeded) => Some(P::Synthesize),
        (P::Init, E::Failed) => Some(P::Error),
        (P::Synthesize, E::Synthesized) => Some(P::Evaluate),
        (P::Synthesize, E::Failed) => Some(P::Error),
        (P::Evaluate, E::Converged) => Some(P::Persist),
        (P::Evaluate, E::NeedsEvidence) => Some(P::Dispatch),
        (P::Evaluate, E::Failed) => Some(P::Error),
        (P::Dispatch, E::Dispatched) => Some(P::Synthesize),
        (P::Persist, E::Persisted) => Some(P::Done),
        (P::Persist, E::Failed) => Some(P::Error),
        _ => None,
    };
    next.ok_or(InvalidTransition { phase, event })
}
