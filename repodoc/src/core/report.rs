//! Markdown run report, derived entirely from a [`RunState`].

use crate::core::state::RunState;

/// Run settings echoed at the end of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub oracle: String,
    pub max_iterations: u32,
    pub max_tool_calls_per_iteration: usize,
}

pub fn render_report(state: &RunState, generated_at: &str, settings: &ReportSettings) -> String {
    let mut lines = vec![
        "# repodoc run report".to_string(),
        String::new(),
        format!("**Generated**: {generated_at}"),
        format!("**Repository**: {}", state.repo_path.display()),
        String::new(),
    ];
    lines.extend(statistics(state));
    lines.extend(history(state));
    if !state.missing_aspects.is_empty() {
        lines.push("## Still missing".to_string());
        lines.push(String::new());
        lines.extend(state.missing_aspects.iter().map(|aspect| format!("- {aspect}")));
        lines.push(String::new());
    }
    lines.extend([
        "## Settings".to_string(),
        String::new(),
        format!("- Oracle: {}", settings.oracle),
        format!("- Max iterations: {}", settings.max_iterations),
        format!(
            "- Max capability calls per iteration: {}",
            settings.max_tool_calls_per_iteration
        ),
    ]);
    lines.join("\n")
}

fn statistics(state: &RunState) -> Vec<String> {
    let confidence = state
        .confidence
        .map_or_else(|| "n/a".to_string(), |confidence| format!("{confidence:.2}"));
    let mut lines = vec![
        "## Statistics".to_string(),
        String::new(),
        format!("- Phase: {}", state.phase),
        format!(
            "- Iterations: {} / {}",
            state.iteration_count, state.max_iterations
        ),
        format!("- Final confidence: {confidence}"),
        format!("- Artifact length: {} chars", state.artifact.chars().count()),
        format!("- Artifact versions: {}", state.artifact_versions.len()),
        format!("- Judged complete: {}", state.is_complete),
        format!("- Stopped by iteration ceiling: {}", state.forced_completion),
    ];
    if let Some(error) = &state.error {
        lines.push(format!("- Error: {error}"));
    }
    lines.push(String::new());
    lines
}

fn history(state: &RunState) -> Vec<String> {
    let mut lines = vec!["## Exploration history".to_string(), String::new()];
    if state.history.is_empty() {
        lines.push("No capability batches were executed.".to_string());
        lines.push(String::new());
    }
    for record in &state.history {
        lines.push(format!("### Iteration {}", record.iteration));
        lines.push(format!("- Action: {}", record.action));
        lines.push(format!("- Findings: {}", record.findings));
        if !record.calls.is_empty() {
            lines.push("- Calls:".to_string());
            lines.extend(record.calls.iter().map(|call| {
                let mark = if call.success { "✓" } else { "✗" };
                format!("  - {mark} {}", call.name)
            }));
        }
        lines.push(String::new());
    }
    lines
}
