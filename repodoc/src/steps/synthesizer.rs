//! Produce or revise the artifact.

use tracing::{debug, info, instrument};

use crate::io::oracle::{Oracle, OracleMode, OracleRequest};
use crate::io::prompt::PromptBuilder;
use crate::steps::StepError;

const NO_EVIDENCE: &str = "(no new evidence was gathered)";

#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    /// Current artifact; empty before the first synthesis.
    pub artifact: &'a str,
    pub seed: &'a str,
    /// Evidence bundle from the latest dispatch, if any.
    pub evidence: Option<&'a str>,
    pub missing: &'a [String],
}

impl SynthesisInput<'_> {
    /// The first call sees only the seed; later calls merge evidence.
    pub fn is_initial(&self) -> bool {
        self.artifact.trim().is_empty() && self.evidence.is_none()
    }
}

/// Ask the oracle for a complete replacement artifact.
#[instrument(skip_all, fields(initial = input.is_initial()))]
pub fn synthesize<O: Oracle + ?Sized>(
    oracle: &O,
    prompts: &PromptBuilder,
    input: &SynthesisInput<'_>,
) -> Result<String, StepError> {
    let prompt = if input.is_initial() {
        prompts.initial(input.seed)
    } else {
        prompts.update(
            input.artifact,
            input.evidence.unwrap_or(NO_EVIDENCE),
            input.missing,
        )
    }
    .map_err(StepError::Prompt)?;
    debug!(prompt_bytes = prompt.len(), "synthesis prompt built");

    let reply = oracle.complete(&OracleRequest {
        mode: OracleMode::Synthesize,
        system: prompts.system(),
        prompt,
    })
    .map_err(StepError::Oracle)?;
    let artifact = strip_outer_fence(&reply);
    if artifact.is_empty() {
        return Err(StepError::UnusableReply(
            "oracle returned an empty artifact".to_string(),
        ));
    }
    info!(artifact_chars = artifact.chars().count(), "artifact synthesized");
    Ok(artifact)
}

/// Remove a single fence wrapping the whole reply (```markdown ... ```).
fn strip_outer_fence(reply: &str) -> String {
    let trimmed = reply.trim();
    if let Some(rest) = trimmed.strip_prefix("```")
        && let Some(body) = rest.strip_suffix("```")
        && let Some((info, inner)) = body.split_once('\n')
        && matches!(info.trim(), "" | "md" | "markdown")
        && !inner.contains("\n```")
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::FailureKind;
    use crate::test_support::ScriptedOracle;

    #[test]
    fn first_call_uses_seed_prompt() {
        let oracle = ScriptedOracle::new().synthesize("# Doc v1");
        let prompts = PromptBuilder::new(100_000);
        let text = synthesize(
            &oracle,
            &prompts,
            &SynthesisInput {
                artifact: "",
                seed: "README: a shop",
                evidence: None,
                missing: &[],
            },
        )
        .expect("synthesize");
        assert_eq!(text, "# Doc v1");
        let requests = oracle.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].mode, OracleMode::Synthesize);
        assert!(requests[0].prompt.contains("README: a shop"));
        assert!(requests[0].prompt.contains("first version"));
    }

    #[test]
    fn later_calls_merge_evidence_and_missing_aspects() {
        let oracle = ScriptedOracle::new().synthesize("# Doc v2");
        let prompts = PromptBuilder::new(100_000);
        let missing = vec!["data model".to_string()];
        synthesize(
            &oracle,
            &prompts,
            &SynthesisInput {
                artifact: "# Doc v1",
                seed: "seed",
                evidence: Some("### Capability: search_code\nResult:\nfound"),
                missing: &missing,
            },
        )
        .expect("synthesize");
        let prompt = &oracle.requests()[0].prompt;
        assert!(prompt.contains("# Doc v1"));
        assert!(prompt.contains("### Capability: search_code"));
        assert!(prompt.contains("- data model"));
    }

    #[test]
    fn oracle_failure_and_empty_reply_have_distinct_kinds() {
        let prompts = PromptBuilder::new(100_000);
        let input = SynthesisInput {
            artifact: "",
            seed: "seed",
            evidence: None,
            missing: &[],
        };
        let failing = ScriptedOracle::new().fail(OracleMode::Synthesize, "connection refused");
        let err = synthesize(&failing, &prompts, &input).expect_err("unreachable");
        assert_eq!(err.kind(), FailureKind::OracleUnreachable);

        let blank = ScriptedOracle::new().synthesize("   \n");
        let err = synthesize(&blank, &prompts, &input).expect_err("blank");
        assert_eq!(err.kind(), FailureKind::UnusableReply);
    }

    #[test]
    fn outer_markdown_fence_is_removed() {
        assert_eq!(strip_outer_fence("```markdown\n# Doc\n\ntext\n```"), "# Doc\n\ntext");
        let nested = "```md\n# Doc\n```rust\nfn x() {}\n```\n```";
        assert_eq!(strip_outer_fence(nested), nested);
        assert_eq!(strip_outer_fence("  # Plain  "), "# Plain");
    }
}
