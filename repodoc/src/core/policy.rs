//! Convergence and iteration-bounding policy.

use crate::core::machine::Event;

/// Iteration at which an unparseable evaluation reply counts as complete.
pub const DEFAULT_FALLBACK_COMPLETE_AFTER: u32 = 3;
/// Confidence assigned when no structured verdict could be recovered.
pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.5;

/// Stopping rules for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergencePolicy {
    pub max_iterations: u32,
    pub fallback_complete_after: u32,
    pub fallback_confidence: f64,
}

/// Why the evaluate phase ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The iteration ceiling was reached; the verdict is ignored.
    Ceiling,
    /// The oracle reported the artifact complete.
    Complete,
    /// More evidence is needed and budget remains.
    Explore,
}

impl Decision {
    pub fn event(self) -> Event {
        match self {
            Self::Ceiling | Self::Complete => Event::Converged,
            Self::Explore => Event::NeedsEvidence,
        }
    }
}

impl ConvergencePolicy {
    /// Decide the exit from `EVALUATE`. The ceiling is checked before the verdict.
    pub fn decide(&self, iteration_count: u32, verdict_complete: bool) -> Decision {
        if iteration_count >= self.max_iterations {
            return Decision::Ceiling;
        }
        if verdict_complete {
            return Decision::Complete;
        }
        Decision::Explore
    }

    /// Completeness assumed by the fallback verdict at `iteration_count`.
    pub fn fallback_complete(&self, iteration_count: u32) -> bool {
        iteration_count >= self.fallback_complete_after
    }
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            fallback_complete_after: DEFAULT_FALLBACK_COMPLETE_AFTER,
            fallback_confidence: DEFAULT_FALLBACK_CONFIDENCE,
        }
    }
}
