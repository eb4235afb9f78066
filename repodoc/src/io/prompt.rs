//! Oracle prompt builder.
//!
//! Templates are embedded at compile time and rendered with minijinja. Each
//! template is split into sections by `<!-- section:KEY required|droppable -->`
//! markers; when a rendered prompt exceeds the byte budget, droppable sections
//! go first (in [`DROP_ORDER`]) and the last remaining section is truncated.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const INITIAL_TEMPLATE: &str = include_str!("prompts/initial.md");
const UPDATE_TEMPLATE: &str = include_str!("prompts/update.md");
const EVALUATE_TEMPLATE: &str = include_str!("prompts/evaluate.md");
const SELECT_TEMPLATE: &str = include_str!("prompts/select.md");

/// Droppable sections, least important first.
pub const DROP_ORDER: [&str; 3] = ["tree", "seed", "missing"];

const TRUNCATED_MARKER: &str = "\n[truncated]";

#[derive(Debug, Clone)]
struct Section {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<Section> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("valid regex")
    });

    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());
    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(Section {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[Section]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

fn apply_budget(sections: &mut Vec<Section>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped prompt section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(total_len(rest));
    let before_len = last.content.len();
    if before_len > allowed {
        let keep = allowed.saturating_sub(TRUNCATED_MARKER.len());
        let mut cut = keep;
        while !last.content.is_char_boundary(cut) {
            cut -= 1;
        }
        last.content.truncate(cut);
        if allowed > TRUNCATED_MARKER.len() {
            last.content.push_str(TRUNCATED_MARKER);
        }
        debug!(
            section = %last.key,
            before_len,
            after_len = last.content.len(),
            "truncated prompt section for budget"
        );
    }
}

fn join_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Inputs for an evaluation prompt.
#[derive(Debug, Clone, Copy)]
pub struct EvaluateInputs<'a> {
    pub document: &'a str,
    pub seed: &'a str,
    pub iteration: u32,
    pub max_iterations: u32,
    pub catalog: &'a str,
}

/// Inputs for a capability-selection prompt.
#[derive(Debug, Clone, Copy)]
pub struct SelectInputs<'a> {
    pub document_excerpt: &'a str,
    pub missing: &'a [String],
    pub tree: &'a str,
    pub catalog: &'a str,
    pub max_calls: usize,
}

/// Renders oracle prompts within a byte budget.
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("initial", INITIAL_TEMPLATE),
            ("update", UPDATE_TEMPLATE),
            ("evaluate", EVALUATE_TEMPLATE),
            ("select", SELECT_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env, budget_bytes }
    }

    /// System message shared by all modes.
    pub fn system(&self) -> String {
        SYSTEM_TEMPLATE.trim().to_string()
    }

    pub fn initial(&self, seed: &str) -> Result<String> {
        self.render("initial", context! { seed => seed.trim() })
    }

    pub fn update(&self, document: &str, evidence: &str, missing: &[String]) -> Result<String> {
        self.render(
            "update",
            context! {
                document => document.trim(),
                evidence => evidence.trim(),
                missing => missing,
            },
        )
    }

    pub fn evaluate(&self, input: &EvaluateInputs<'_>) -> Result<String> {
        self.render(
            "evaluate",
            context! {
                document => input.document.trim(),
                seed => non_empty(input.seed),
                iteration => input.iteration,
                max_iterations => input.max_iterations,
                catalog => input.catalog.trim(),
            },
        )
    }

    pub fn select(&self, input: &SelectInputs<'_>) -> Result<String> {
        self.render(
            "select",
            context! {
                document => input.document_excerpt.trim(),
                missing => input.missing,
                tree => non_empty(input.tree),
                catalog => input.catalog.trim(),
                max_calls => input.max_calls,
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let rendered = self
            .env
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .with_context(|| format!("render {name} prompt"))?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        Ok(join_sections(&sections))
    }
}
