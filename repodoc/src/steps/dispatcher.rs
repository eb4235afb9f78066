//! Resolve and execute one bounded batch of capability calls.
//!
//! Resolution order: the verdict's proposals (unknown names dropped), then an
//! oracle selection, then a fixed default call. Execution never fails as a
//! whole; each call is recorded with its own outcome.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{CapabilityError, REPO_PATH_ARG, Registry, without_repo_path};
use crate::core::evidence::{EvidenceEntry, Outcome, render_bundle, truncate_chars};
use crate::core::state::{CapabilityCall, IterationRecord};
use crate::core::verdict::{ProposedCall, parse_selection};
use crate::io::oracle::{Oracle, OracleMode, OracleRequest};
use crate::io::prompt::{PromptBuilder, SelectInputs};

/// Capability used when neither the verdict nor the selection yields a call.
pub const DEFAULT_CAPABILITY: &str = "list_files_by_extension";
/// Extension listed by the default call when the seed found no source files.
pub const DEFAULT_EXTENSION: &str = ".py";

const EMPTY_BATCH_EVIDENCE: &str = "No capability calls were executed.";

#[derive(Debug, Clone, Copy)]
pub struct DispatchLimits {
    pub max_calls: usize,
    /// Result characters kept in the audit trail.
    pub record_result_chars: usize,
    /// Result characters kept in the evidence bundle.
    pub evidence_result_chars: usize,
    /// Artifact characters shown to the selection oracle.
    pub selection_artifact_chars: usize,
}

/// Fixed collaborators for a run.
pub struct DispatchContext<'a> {
    pub root: &'a Path,
    pub registry: &'a Registry,
    pub prompts: &'a PromptBuilder,
    pub limits: DispatchLimits,
}

/// Per-iteration inputs.
#[derive(Debug, Clone, Copy)]
pub struct DispatchInput<'a> {
    pub iteration: u32,
    pub proposals: &'a [ProposedCall],
    pub artifact: &'a str,
    pub missing: &'a [String],
    pub tree: &'a str,
    pub dominant_extension: Option<&'a str>,
    pub catalog: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSource {
    Proposed,
    Selected,
    Default,
}

impl CallSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Selected => "selected",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub evidence: String,
    pub record: IterationRecord,
    pub source: CallSource,
}

#[instrument(skip_all, fields(iteration = input.iteration))]
pub fn dispatch<O: Oracle + ?Sized>(
    oracle: &O,
    ctx: &DispatchContext<'_>,
    input: &DispatchInput<'_>,
) -> DispatchOutcome {
    let (mut batch, source) = resolve_batch(oracle, ctx, input);
    if batch.len() > ctx.limits.max_calls {
        info!(
            dropped = batch.len() - ctx.limits.max_calls,
            max = ctx.limits.max_calls,
            "batch over budget, dropping excess calls"
        );
        batch.truncate(ctx.limits.max_calls);
    }

    let root_arg = Value::String(ctx.root.display().to_string());
    let mut calls = Vec::with_capacity(batch.len());
    let mut outputs = Vec::with_capacity(batch.len());
    for proposal in &batch {
        let result = arguments_of(proposal)
            .and_then(|args| ctx.registry.invoke(ctx.root, &proposal.tool, &args));
        let mut arguments = match &proposal.args {
            Value::Object(args) => without_repo_path(args),
            _ => Map::new(),
        };
        arguments.insert(REPO_PATH_ARG.to_string(), root_arg.clone());

        let (recorded, success) = match &result {
            Ok(text) => (truncate_chars(text, ctx.limits.record_result_chars), true),
            Err(err) => {
                warn!(capability = %proposal.tool, error = %err, "capability call failed");
                (err.to_string(), false)
            }
        };
        debug!(capability = %proposal.tool, success, "capability call finished");
        calls.push(CapabilityCall {
            name: proposal.tool.clone(),
            arguments,
            result: recorded,
            success,
        });
        outputs.push(result.map_err(|err| err.to_string()));
    }

    let entries: Vec<EvidenceEntry<'_>> = batch
        .iter()
        .zip(&calls)
        .zip(&outputs)
        .map(|((proposal, call), output)| EvidenceEntry {
            name: &call.name,
            arguments: &call.arguments,
            reason: proposal.reason.as_deref(),
            outcome: match output {
                Ok(text) => Outcome::Ok(text),
                Err(message) => Outcome::Failed(message),
            },
        })
        .collect();
    let evidence = if entries.is_empty() {
        EMPTY_BATCH_EVIDENCE.to_string()
    } else {
        render_bundle(&entries, ctx.limits.evidence_result_chars)
    };

    let record = IterationRecord {
        iteration: input.iteration,
        action: format!(
            "Executed {} capability call(s) ({})",
            calls.len(),
            source.as_str()
        ),
        findings: summarize(&calls),
        calls,
    };
    info!(
        source = source.as_str(),
        succeeded = record.succeeded(),
        failed = record.failed(),
        "dispatch finished"
    );
    DispatchOutcome {
        evidence,
        record,
        source,
    }
}

fn resolve_batch<O: Oracle + ?Sized>(
    oracle: &O,
    ctx: &DispatchContext<'_>,
    input: &DispatchInput<'_>,
) -> (Vec<ProposedCall>, CallSource) {
    let proposed = known_calls(ctx.registry, input.proposals.to_vec());
    if !proposed.is_empty() {
        return (proposed, CallSource::Proposed);
    }
    if let Some(selected) = select_calls(oracle, ctx, input) {
        return (selected, CallSource::Selected);
    }
    (default_calls(ctx.registry, input.dominant_extension), CallSource::Default)
}

fn known_calls(registry: &Registry, calls: Vec<ProposedCall>) -> Vec<ProposedCall> {
    calls
        .into_iter()
        .filter(|call| {
            let known = registry.contains(&call.tool);
            if !known {
                warn!(capability = %call.tool, "skipping unknown capability");
            }
            known
        })
        .collect()
}

/// Ask the oracle to pick calls. `None` means the default applies.
fn select_calls<O: Oracle + ?Sized>(
    oracle: &O,
    ctx: &DispatchContext<'_>,
    input: &DispatchInput<'_>,
) -> Option<Vec<ProposedCall>> {
    let excerpt = truncate_chars(input.artifact, ctx.limits.selection_artifact_chars);
    let prompt = ctx
        .prompts
        .select(&SelectInputs {
            document_excerpt: &excerpt,
            missing: input.missing,
            tree: input.tree,
            catalog: input.catalog,
            max_calls: ctx.limits.max_calls,
        })
        .inspect_err(|err| warn!(error = %err, "failed to render selection prompt"))
        .ok()?;
    let reply = oracle
        .complete(&OracleRequest {
            mode: OracleMode::SelectCapabilities,
            system: ctx.prompts.system(),
            prompt,
        })
        .inspect_err(|err| warn!(error = %err, "capability selection failed"))
        .ok()?;
    let Some(calls) = parse_selection(&reply) else {
        warn!("capability selection reply is unparseable");
        return None;
    };
    let calls = known_calls(ctx.registry, calls);
    (!calls.is_empty()).then_some(calls)
}

fn default_calls(registry: &Registry, dominant_extension: Option<&str>) -> Vec<ProposedCall> {
    if !registry.contains(DEFAULT_CAPABILITY) {
        warn!("default capability is not registered, nothing to dispatch");
        return Vec::new();
    }
    let extension = dominant_extension.unwrap_or(DEFAULT_EXTENSION);
    let mut args = Map::new();
    args.insert("extension".to_string(), Value::String(extension.to_string()));
    vec![ProposedCall::new(
        DEFAULT_CAPABILITY,
        args,
        Some("default exploration of the dominant source language"),
    )]
}

fn arguments_of(proposal: &ProposedCall) -> Result<Map<String, Value>, CapabilityError> {
    match &proposal.args {
        Value::Object(args) => Ok(args.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(CapabilityError::InvalidArguments {
            name: proposal.tool.clone(),
            message: format!("arguments must be an object, got {other}"),
        }),
    }
}

fn summarize(calls: &[CapabilityCall]) -> String {
    if calls.is_empty() {
        return "nothing executed".to_string();
    }
    let succeeded = calls.iter().filter(|call| call.success).count();
    format!("{succeeded} succeeded, {} failed", calls.len() - succeeded)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::test_support::ScriptedOracle;

    const LIMITS: DispatchLimits = DispatchLimits {
        max_calls: 5,
        record_result_chars: 2000,
        evidence_result_chars: 12_000,
        selection_artifact_chars: 2000,
    };

    fn repo() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        fs::write(dir.path().join("src/app.py"), "def main():\n    return 1\n").expect("write");
        fs::write(dir.path().join("README.md"), "# App\n").expect("write");
        dir
    }

    fn call(tool: &str, args: Value) -> ProposedCall {
        ProposedCall {
            tool: tool.to_string(),
            args,
            reason: Some("look".to_string()),
        }
    }

    fn input(proposals: &[ProposedCall]) -> DispatchInput<'_> {
        DispatchInput {
            iteration: 2,
            proposals,
            artifact: "# Doc",
            missing: &[],
            tree: "src/",
            dominant_extension: Some(".py"),
            catalog: "",
        }
    }

    #[test]
    fn proposed_outline_call_runs_without_selection() {
        let dir = repo();
        let registry = Registry::builtin().expect("registry");
        let prompts = PromptBuilder::new(100_000);
        let ctx = DispatchContext {
            root: dir.path(),
            registry: &registry,
            prompts: &prompts,
            limits: LIMITS,
        };
        let oracle = ScriptedOracle::new();
        let proposals = [call("get_file_outline", json!({"file_path": "src/app.py"}))];

        let outcome = dispatch(&oracle, &ctx, &input(&proposals));

        assert_eq!(outcome.source, CallSource::Proposed);
        assert!(oracle.requests().is_empty());
        assert_eq!(outcome.record.iteration, 2);
        assert_eq!(outcome.record.calls.len(), 1);
        assert!(outcome.record.calls[0].success);
        assert!(outcome.evidence.contains("### Capability: get_file_outline"));
        assert!(outcome.evidence.contains("Reason: look"));
        assert!(outcome.evidence.contains("main"));
    }

    #[test]
    fn unknown_only_proposal_falls_back_to_default() {
        let dir = repo();
        let registry = Registry::builtin().expect("registry");
        let prompts = PromptBuilder::new(100_000);
        let ctx = DispatchContext {
            root: dir.path(),
            registry: &registry,
            prompts: &prompts,
            limits: LIMITS,
        };
        let oracle = ScriptedOracle::new().select("I would not call anything.");
        let proposals = [call("delete_everything", json!({}))];

        let outcome = dispatch(&oracle, &ctx, &input(&proposals));

        assert_eq!(outcome.source, CallSource::Default);
        assert_eq!(oracle.requests().len(), 1);
        assert_eq!(oracle.requests()[0].mode, OracleMode::SelectCapabilities);
        assert_eq!(outcome.record.calls.len(), 1);
        let recorded = &outcome.record.calls[0];
        assert_eq!(recorded.name, DEFAULT_CAPABILITY);
        assert_eq!(recorded.arguments["extension"], json!(".py"));
        assert!(recorded.success);
        assert!(recorded.result.contains("src/app.py"));
        assert!(outcome.record.calls.iter().all(|c| c.name != "delete_everything"));
    }

    #[test]
    fn selection_reply_supplies_calls() {
        let dir = repo();
        let registry = Registry::builtin().expect("registry");
        let prompts = PromptBuilder::new(100_000);
        let ctx = DispatchContext {
            root: dir.path(),
            registry: &registry,
            prompts: &prompts,
            limits: LIMITS,
        };
        let oracle = ScriptedOracle::new().select(
            r#"{"tool_calls": [{"tool": "get_file_content", "args": {"file_path": "README.md"}}]}"#,
        );

        let outcome = dispatch(&oracle, &ctx, &input(&[]));

        assert_eq!(outcome.source, CallSource::Selected);
        assert!(outcome.evidence.contains("=== File: README.md ==="));
    }

    #[test]
    fn failed_selection_call_is_recovered() {
        let dir = repo();
        let registry = Registry::builtin().expect("registry");
        let prompts = PromptBuilder::new(100_000);
        let ctx = DispatchContext {
            root: dir.path(),
            registry: &registry,
            prompts: &prompts,
            limits: LIMITS,
        };
        let oracle = ScriptedOracle::new().fail(OracleMode::SelectCapabilities, "offline");

        let outcome = dispatch(
            &oracle,
            &ctx,
            &DispatchInput {
                dominant_extension: None,
                ..input(&[])
            },
        );

        assert_eq!(outcome.source, CallSource::Default);
        assert_eq!(outcome.record.calls[0].arguments["extension"], json!(DEFAULT_EXTENSION));
    }

    #[test]
    fn mixed_batch_records_each_outcome() {
        let dir = repo();
        let registry = Registry::builtin().expect("registry");
        let prompts = PromptBuilder::new(100_000);
        let ctx = DispatchContext {
            root: dir.path(),
            registry: &registry,
            prompts: &prompts,
            limits: LIMITS,
        };
        let oracle = ScriptedOracle::new();
        let proposals = [
            call("get_file_content", json!({"file_path": "README.md"})),
            call("get_file_content", json!({"file_path": "missing.txt"})),
            call("search_code", json!({"query": "main"})),
        ];

        let outcome = dispatch(&oracle, &ctx, &input(&proposals));

        let successes: Vec<bool> = outcome.record.calls.iter().map(|c| c.success).collect();
        assert_eq!(successes, vec![true, false, true]);
        assert_eq!(outcome.record.succeeded(), 2);
        assert_eq!(outcome.record.failed(), 1);
        assert_eq!(outcome.record.findings, "2 succeeded, 1 failed");
        assert!(outcome.evidence.contains("### Capability: get_file_content (failed)"));
        assert!(outcome.evidence.contains("=== Matches for \"main\""));
    }

    #[test]
    fn batch_is_truncated_to_budget() {
        let dir = repo();
        let registry = Registry::builtin().expect("registry");
        let prompts = PromptBuilder::new(100_000);
        let ctx = DispatchContext {
            root: dir.path(),
            registry: &registry,
            prompts: &prompts,
            limits: DispatchLimits {
                max_calls: 2,
                ..LIMITS
            },
        };
        let oracle = ScriptedOracle::new();
        let proposals = vec![call("get_directory_tree", json!({})); 4];

        let outcome = dispatch(&oracle, &ctx, &input(&proposals));

        assert_eq!(outcome.record.calls.len(), 2);
    }

    #[test]
    fn oracle_supplied_repo_path_is_replaced() {
        let dir = repo();
        let registry = Registry::builtin().expect("registry");
        let prompts = PromptBuilder::new(100_000);
        let ctx = DispatchContext {
            root: dir.path(),
            registry: &registry,
            prompts: &prompts,
            limits: LIMITS,
        };
        let oracle = ScriptedOracle::new();
        let proposals = [call(
            "get_file_content",
            json!({"file_path": "README.md", "repo_path": "/etc"}),
        )];

        let outcome = dispatch(&oracle, &ctx, &input(&proposals));

        let recorded = &outcome.record.calls[0];
        assert!(recorded.success);
        assert_eq!(
            recorded.arguments[REPO_PATH_ARG],
            json!(dir.path().display().to_string())
        );
        assert!(recorded.result.contains("# App"));
    }

    #[test]
    fn non_object_arguments_fail_the_call_only() {
        let dir = repo();
        let registry = Registry::builtin().expect("registry");
        let prompts = PromptBuilder::new(100_000);
        let ctx = DispatchContext {
            root: dir.path(),
            registry: &registry,
            prompts: &prompts,
            limits: LIMITS,
        };
        let oracle = ScriptedOracle::new();
        let proposals = [
            call("get_file_content", json!("README.md")),
            call("get_directory_tree", Value::Null),
        ];

        let outcome = dispatch(&oracle, &ctx, &input(&proposals));

        assert!(!outcome.record.calls[0].success);
        assert!(outcome.record.calls[1].success);
    }
}
