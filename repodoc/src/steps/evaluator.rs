//! Judge the artifact's completeness.

use tracing::{info, instrument, warn};

use crate::core::policy::ConvergencePolicy;
use crate::core::verdict::{CompletenessVerdict, VerdictSource, parse_verdict};
use crate::io::oracle::{Oracle, OracleMode, OracleRequest};
use crate::io::prompt::{EvaluateInputs, PromptBuilder};
use crate::steps::StepError;

#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub artifact: &'a str,
    pub seed: &'a str,
    pub iteration_count: u32,
    pub max_iterations: u32,
    /// Capability catalog offered for proposals.
    pub catalog: &'a str,
}

/// Ask the oracle for a verdict.
///
/// Only an unreachable oracle is an error; unstructured replies resolve to the
/// policy's fallback verdict.
#[instrument(skip_all, fields(iteration = input.iteration_count))]
pub fn evaluate<O: Oracle + ?Sized>(
    oracle: &O,
    prompts: &PromptBuilder,
    policy: &ConvergencePolicy,
    input: &EvaluationInput<'_>,
) -> Result<CompletenessVerdict, StepError> {
    let prompt = prompts.evaluate(&EvaluateInputs {
        document: input.artifact,
        seed: input.seed,
        iteration: input.iteration_count,
        max_iterations: input.max_iterations,
        catalog: input.catalog,
    })
    .map_err(StepError::Prompt)?;
    let reply = oracle.complete(&OracleRequest {
        mode: OracleMode::Evaluate,
        system: prompts.system(),
        prompt,
    })
    .map_err(StepError::Oracle)?;

    let verdict = parse_verdict(&reply, input.iteration_count, policy);
    match verdict.source {
        VerdictSource::Parsed => {}
        VerdictSource::NoStructuredBlock => {
            warn!("evaluation reply has no structured block, using fallback verdict");
        }
        VerdictSource::MalformedBlock => {
            warn!("evaluation reply block is malformed, using fallback verdict");
        }
    }
    info!(
        complete = verdict.is_complete,
        confidence = verdict.confidence,
        missing = verdict.missing_aspects.len(),
        proposed = verdict.proposed_calls.len(),
        "verdict"
    );
    Ok(verdict)
}
