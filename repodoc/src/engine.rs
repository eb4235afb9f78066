//! Run driver: owns the [`RunState`] and walks the phase machine to a terminal phase.
//!
//! Each loop iteration checks for cancellation, executes the step for the
//! current phase, and feeds the resulting event through
//! [`transition`](crate::core::machine::transition). Step functions never touch
//! the phase directly.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument, warn};

use crate::capabilities::Registry;
use crate::core::machine::{Event, Phase, transition};
use crate::core::policy::{ConvergencePolicy, Decision};
use crate::core::report::ReportSettings;
use crate::core::state::{FailureKind, RunFailure, RunState};
use crate::io::config::RepodocConfig;
use crate::io::oracle::{Oracle, build_oracle};
use crate::io::persist::{ArtifactSink, FsArtifactSink, PersistedPaths};
use crate::io::prompt::PromptBuilder;
use crate::io::seed::collect_seed;
use crate::steps::dispatcher::{DispatchContext, DispatchInput, DispatchLimits, dispatch};
use crate::steps::StepError;
use crate::steps::evaluator::{EvaluationInput, evaluate};
use crate::steps::synthesizer::{SynthesisInput, synthesize};

/// Shared cooperative cancellation flag, checked before every step.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One applied phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub event: Event,
}

/// Final state of a run plus the written outputs, when persistence succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub state: RunState,
    pub persisted: Option<PersistedPaths>,
}

pub struct Engine {
    config: RepodocConfig,
    registry: Registry,
    oracle: Box<dyn Oracle>,
    sink: Box<dyn ArtifactSink>,
    prompts: PromptBuilder,
    cancel: CancelFlag,
}

impl Engine {
    /// Fails when `config` does not validate.
    pub fn new(
        config: RepodocConfig,
        registry: Registry,
        oracle: Box<dyn Oracle>,
        sink: Box<dyn ArtifactSink>,
    ) -> Result<Self> {
        config.validate().context("validate engine config")?;
        let prompts = PromptBuilder::new(config.agent.prompt_budget_bytes);
        Ok(Self {
            config,
            registry,
            oracle,
            sink,
            prompts,
            cancel: CancelFlag::new(),
        })
    }

    /// Engine with the built-in capabilities, the configured oracle and filesystem outputs.
    pub fn from_config(config: RepodocConfig) -> Result<Self> {
        let registry = Registry::builtin().context("build capability registry")?;
        let oracle = build_oracle(&config.oracle)?;
        let settings = ReportSettings {
            oracle: oracle.label(),
            max_iterations: config.agent.max_iterations,
            max_tool_calls_per_iteration: config.agent.max_tool_calls_per_iteration,
        };
        let sink = FsArtifactSink::new(config.output.clone(), settings);
        Self::new(config, registry, oracle, Box::new(sink))
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RepodocConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn run(&self, root: &Path) -> RunOutcome {
        self.run_with(root, |_, _| {})
    }

    /// Run to a terminal phase, reporting every transition with the state after it.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn run_with<F>(&self, root: &Path, mut on_transition: F) -> RunOutcome
    where
        F: FnMut(&TransitionRecord, &RunState),
    {
        let policy = self.config.agent.policy();
        let catalog = self.registry.render_catalog();
        let mut state = RunState::new(root, policy.max_iterations);
        let mut persisted = None;
        info!(
            max_iterations = policy.max_iterations,
            oracle = %self.oracle.label(),
            "run started"
        );

        while !state.phase.is_terminal() {
            if self.cancel.is_cancelled() {
                warn!(phase = %state.phase, "run cancelled");
                let failure = RunFailure::new(
                    FailureKind::Cancelled,
                    format!("cancelled before {}", state.phase),
                );
                self.fail(&mut state, failure, Event::Cancelled, &mut on_transition);
                break;
            }

            let step = match state.phase {
                Phase::Init => self.seed_step(&mut state),
                Phase::Synthesize => self.synthesize_step(&mut state),
                Phase::Evaluate => self.evaluate_step(&mut state, &policy, &catalog),
                Phase::Dispatch => Ok(self.dispatch_step(&mut state, &catalog)),
                Phase::Persist => match self.sink.persist(&state) {
                    Ok(paths) => {
                        persisted = Some(paths);
                        Ok(Event::Persisted)
                    }
                    Err(err) => Err(RunFailure::new(
                        FailureKind::Persistence,
                        format!("{err:#}"),
                    )),
                },
                Phase::Done | Phase::Error => break,
            };

            match step {
                Ok(event) => self.advance(&mut state, event, &mut on_transition),
                Err(failure) => {
                    error!(phase = %state.phase, error = %failure, "step failed");
                    self.fail(&mut state, failure, Event::Failed, &mut on_transition);
                }
            }
        }

        info!(
            status = state.status().as_str(),
            iterations = state.iteration_count,
            artifact_chars = state.artifact.chars().count(),
            "run finished"
        );
        RunOutcome { state, persisted }
    }

    fn seed_step(&self, state: &mut RunState) -> Result<Event, RunFailure> {
        let seed = collect_seed(&state.repo_path)
            .map_err(|err| RunFailure::new(FailureKind::FatalInput, format!("{err:#}")))?;
        state.seed = seed;
        Ok(Event::Seeded)
    }

    fn synthesize_step(&self, state: &mut RunState) -> Result<Event, RunFailure> {
        let artifact = synthesize(
            &*self.oracle,
            &self.prompts,
            &SynthesisInput {
                artifact: &state.artifact,
                seed: &state.seed.summary,
                evidence: state.pending_evidence.as_deref(),
                missing: &state.missing_aspects,
            },
        )
        .map_err(StepError::into_failure)?;

        state.pending_evidence = None;
        state.artifact_versions.push(artifact.clone());
        state.artifact = artifact;
        state.iteration_count += 1;
        debug!(
            iteration = state.iteration_count,
            chars = state.artifact.chars().count(),
            "artifact version recorded"
        );
        Ok(Event::Synthesized)
    }

    fn evaluate_step(
        &self,
        state: &mut RunState,
        policy: &ConvergencePolicy,
        catalog: &str,
    ) -> Result<Event, RunFailure> {
        let verdict = evaluate(
            &*self.oracle,
            &self.prompts,
            policy,
            &EvaluationInput {
                artifact: &state.artifact,
                seed: &state.seed.summary,
                iteration_count: state.iteration_count,
                max_iterations: state.max_iterations,
                catalog,
            },
        )
        .map_err(StepError::into_failure)?;

        let decision = policy.decide(state.iteration_count, verdict.is_complete);
        state.is_complete = verdict.is_complete;
        state.confidence = Some(verdict.confidence);
        state.missing_aspects = verdict.missing_aspects;
        state.pending_proposals = verdict.proposed_calls;
        state.forced_completion = decision == Decision::Ceiling && !verdict.is_complete;
        if state.forced_completion {
            info!(
                iteration = state.iteration_count,
                "iteration ceiling reached before the artifact was judged complete"
            );
        }
        Ok(decision.event())
    }

    fn dispatch_step(&self, state: &mut RunState, catalog: &str) -> Event {
        let proposals = std::mem::take(&mut state.pending_proposals);
        let agent = &self.config.agent;
        let ctx = DispatchContext {
            root: &state.repo_path,
            registry: &self.registry,
            prompts: &self.prompts,
            limits: DispatchLimits {
                max_calls: agent.max_tool_calls_per_iteration,
                record_result_chars: agent.record_result_chars,
                evidence_result_chars: agent.evidence_result_chars,
                selection_artifact_chars: agent.selection_artifact_chars,
            },
        };
        let outcome = dispatch(
            &*self.oracle,
            &ctx,
            &DispatchInput {
                iteration: state.iteration_count,
                proposals: &proposals,
                artifact: &state.artifact,
                missing: &state.missing_aspects,
                tree: &state.seed.directory_tree,
                dominant_extension: state.seed.dominant_extension.as_deref(),
                catalog,
            },
        );
        state.pending_evidence = Some(outcome.evidence);
        state.history.push(outcome.record);
        Event::Dispatched
    }

    fn advance<F>(&self, state: &mut RunState, event: Event, on_transition: &mut F)
    where
        F: FnMut(&TransitionRecord, &RunState),
    {
        let from = state.phase;
        match transition(from, event) {
            Ok(to) => {
                state.phase = to;
                debug!(%from, %to, ?event, "transition");
                let violations = state.invariant_violations();
                if !violations.is_empty() {
                    error!(?violations, "run state invariants violated");
                }
                on_transition(&TransitionRecord { from, to, event }, state);
            }
            Err(err) => {
                error!(error = %err, "rejected transition");
                state.error = Some(RunFailure::new(FailureKind::Internal, err.to_string()));
                state.phase = Phase::Error;
                on_transition(
                    &TransitionRecord {
                        from,
                        to: Phase::Error,
                        event,
                    },
                    state,
                );
            }
        }
    }

    fn fail<F>(&self, state: &mut RunState, failure: RunFailure, event: Event, on_transition: &mut F)
    where
        F: FnMut(&TransitionRecord, &RunState),
    {
        state.error = Some(failure);
        self.advance(state, event, on_transition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixtureRepo, MemorySink, ScriptedOracle};

    fn engine(oracle: &ScriptedOracle, sink: &MemorySink, max_iterations: u32) -> Engine {
        let mut config = RepodocConfig::default();
        config.agent.max_iterations = max_iterations;
        Engine::new(
            config,
            Registry::builtin().expect("registry"),
            Box::new(oracle.clone()),
            Box::new(sink.clone()),
        )
        .expect("engine")
    }

    const COMPLETE: &str = r#"{"is_complete": true, "confidence_score": 0.8}"#;

    #[test]
    fn complete_verdict_persists_after_one_iteration() {
        let repo = FixtureRepo::python_service();
        let oracle = ScriptedOracle::new().synthesize("# Orders").evaluate(COMPLETE);
        let sink = MemorySink::new();

        let outcome = engine(&oracle, &sink, 5).run(repo.path());

        assert_eq!(outcome.state.phase, Phase::Done);
        assert_eq!(outcome.state.iteration_count, 1);
        assert!(!outcome.state.forced_completion);
        assert!(outcome.persisted.is_some());
        assert_eq!(sink.saved().len(), 1);
        oracle.assert_drained();
    }

    #[test]
    fn transitions_are_reported_in_order() {
        let repo = FixtureRepo::python_service();
        let oracle = ScriptedOracle::new().synthesize("# Orders").evaluate(COMPLETE);
        let sink = MemorySink::new();
        let mut phases = Vec::new();

        engine(&oracle, &sink, 5).run_with(repo.path(), |record, _| phases.push(record.to));

        assert_eq!(
            phases,
            vec![Phase::Synthesize, Phase::Evaluate, Phase::Persist, Phase::Done]
        );
    }

    #[test]
    fn zero_iteration_ceiling_is_rejected() {
        let mut config = RepodocConfig::default();
        config.agent.max_iterations = 0;
        let built = Engine::new(
            config,
            Registry::builtin().expect("registry"),
            Box::new(ScriptedOracle::new()),
            Box::new(MemorySink::new()),
        );
        let err = built.err().expect("invalid config");
        assert!(format!("{err:#}").contains("max_iterations"));
    }

    #[test]
    fn cancellation_before_start_ends_in_error() {
        let repo = FixtureRepo::python_service();
        let oracle = ScriptedOracle::new();
        let sink = MemorySink::new();
        let engine = engine(&oracle, &sink, 5);
        engine.cancel_flag().cancel();

        let outcome = engine.run(repo.path());

        assert_eq!(outcome.state.phase, Phase::Error);
        let failure = outcome.state.error.expect("error recorded");
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert!(oracle.requests().is_empty());
        assert!(sink.saved().is_empty());
    }
}
