//! Evidence bundle rendering and text truncation.

use serde_json::{Map, Value};

pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Outcome of one executed capability as seen by the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<'a> {
    Ok(&'a str),
    Failed(&'a str),
}

/// One capability execution folded into the evidence bundle.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceEntry<'a> {
    pub name: &'a str,
    pub arguments: &'a Map<String, Value>,
    pub reason: Option<&'a str>,
    pub outcome: Outcome<'a>,
}

/// Truncate `text` to at most `max_chars` characters, appending a marker when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Render the bundle handed to the next synthesis call.
///
/// Each entry carries name, arguments, rationale (when present) and either the
/// result or the failure description. Results longer than `result_chars` are cut.
pub fn render_bundle(entries: &[EvidenceEntry<'_>], result_chars: usize) -> String {
    let mut out = String::new();
    for entry in entries {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        let arguments = serde_json::to_string(entry.arguments).unwrap_or_else(|_| "{}".into());
        match entry.outcome {
            Outcome::Ok(result) => {
                out.push_str(&format!("### Capability: {}\n", entry.name));
                out.push_str(&format!("Arguments: {arguments}\n"));
                if let Some(reason) = entry.reason.filter(|r| !r.trim().is_empty()) {
                    out.push_str(&format!("Reason: {}\n", reason.trim()));
                }
                out.push_str("Result:\n");
                out.push_str(&truncate_chars(result, result_chars));
            }
            Outcome::Failed(error) => {
                out.push_str(&format!("### Capability: {} (failed)\n", entry.name));
                out.push_str(&format!("Arguments: {arguments}\n"));
                if let Some(reason) = entry.reason.filter(|r| !r.trim().is_empty()) {
                    out.push_str(&format!("Reason: {}\n", reason.trim()));
                }
                out.push_str(&format!("Error: {error}"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), format!("hé{TRUNCATION_MARKER}"));
    }

    #[test]
    fn bundle_includes_success_and_failure() {
        let ok_args = args(json!({"file_path": "a.py"}));
        let bad_args = args(json!({"file_path": "missing.py"}));
        let bundle = render_bundle(
            &[
                EvidenceEntry {
                    name: "get_file_outline",
                    arguments: &ok_args,
                    reason: Some("structure"),
                    outcome: Outcome::Ok("class A"),
                },
                EvidenceEntry {
                    name: "get_file_content",
                    arguments: &bad_args,
                    reason: None,
                    outcome: Outcome::Failed("file not found: missing.py"),
                },
            ],
            100,
        );
        assert!(bundle.contains("### Capability: get_file_outline\n"));
        assert!(bundle.contains("Reason: structure"));
        assert!(bundle.contains("class A"));
        assert!(bundle.contains("### Capability: get_file_content (failed)"));
        assert!(bundle.contains("Error: file not found: missing.py"));
        assert!(bundle.contains(r#"{"file_path":"missing.py"}"#));
    }

    #[test]
    fn bundle_truncates_long_results() {
        let empty = Map::new();
        let long = "x".repeat(50);
        let bundle = render_bundle(
            &[EvidenceEntry {
                name: "search_code",
                arguments: &empty,
                reason: None,
                outcome: Outcome::Ok(&long),
            }],
            10,
        );
        assert!(bundle.ends_with(TRUNCATION_MARKER));
        assert!(!bundle.contains(&long));
    }
}
