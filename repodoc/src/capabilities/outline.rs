//! Structural capabilities: file outlines, function and class lookup.
//!
//! Extraction is line-oriented and regex-driven. Definition bodies are found by
//! indentation for Python and by brace matching for brace languages; anything
//! else falls back to a fixed window of lines after the match.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::files::read_repo_file;
use super::{CapabilityError, CapabilityResult, CapabilitySpec, Param, ParamKind, parse_args};

const WINDOW_LINES: usize = 30;
const MAX_OUTLINE_IMPORTS: usize = 20;
const LANGUAGE_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "new", "else", "match", "with",
];

pub(super) fn specs() -> Vec<CapabilitySpec> {
    let file_path = Param::required(
        "file_path",
        ParamKind::String,
        "path relative to the repository root",
    );
    vec![
        CapabilitySpec {
            name: "get_file_outline",
            description: "List imports, types/classes and functions declared in a source file.",
            params: vec![file_path.clone()],
            handler: get_file_outline,
        },
        CapabilitySpec {
            name: "get_function_info",
            description: "Show the location and source of a function or method definition.",
            params: vec![
                file_path.clone(),
                Param::required("function_name", ParamKind::String, "function name"),
            ],
            handler: get_function_info,
        },
        CapabilitySpec {
            name: "get_class_info",
            description: "Show a class/struct/enum/trait/interface definition with its bases and methods.",
            params: vec![
                file_path,
                Param::required("class_name", ParamKind::String, "type name"),
            ],
            handler: get_class_info,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Language {
    Python,
    Rust,
    JavaScript,
    Java,
    Go,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockStyle {
    Indent,
    Braces,
}

impl Language {
    fn detect(path: &str) -> Option<Self> {
        let ext = Path::new(path)
            .extension()?
            .to_string_lossy()
            .to_ascii_lowercase();
        match ext.as_str() {
            "py" | "pyi" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" => Some(Self::JavaScript),
            "java" => Some(Self::Java),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Python => "Python",
            Self::Rust => "Rust",
            Self::JavaScript => "JavaScript/TypeScript",
            Self::Java => "Java",
            Self::Go => "Go",
        }
    }

    fn fence(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Rust => "rust",
            Self::JavaScript => "typescript",
            Self::Java => "java",
            Self::Go => "go",
        }
    }

    fn block_style(self) -> BlockStyle {
        match self {
            Self::Python => BlockStyle::Indent,
            _ => BlockStyle::Braces,
        }
    }

    /// Definition pattern for a named function; `NAME` is substituted.
    fn function_template(self) -> &'static str {
        match self {
            Self::Python => r"^\s*(?:async\s+)?def\s+NAME\s*\(",
            Self::Rust => {
                r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe)\s+)*(?:extern\s+"[^"]*"\s+)?fn\s+NAME\b"#
            }
            Self::JavaScript => {
                r"(?:^|\s)(?:async\s+)?function\s*\*?\s*NAME\s*\(|\bNAME\s*[=:]\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|\w+\s*=>)|^\s*(?:(?:public|private|protected|static|async|get|set)\s+)*NAME\s*\([^)]*\)[^;]*\{"
            }
            Self::Java => {
                r"^\s*(?:(?:public|private|protected|static|final|abstract|synchronized|native|default)\s+)*(?:<[^>]+>\s+)?[\w<>\[\],.?]+\s+NAME\s*\([^;]*$"
            }
            Self::Go => r"^func\s+(?:\([^)]*\)\s*)?NAME\s*[\(\[]",
        }
    }

    /// Definition pattern for a named type; `NAME` is substituted.
    fn class_template(self) -> &'static str {
        match self {
            Self::Python => r"^\s*(?P<kind>class)\s+NAME\b(?P<rest>.*)$",
            Self::Rust => {
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?P<kind>struct|enum|trait|union)\s+NAME\b(?P<rest>.*)$"
            }
            Self::JavaScript => {
                r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?P<kind>class|interface)\s+NAME\b(?P<rest>.*)$"
            }
            Self::Java => {
                r"^\s*(?:(?:public|private|protected|static|final|abstract|sealed)\s+)*(?P<kind>class|interface|enum|record)\s+NAME\b(?P<rest>.*)$"
            }
            Self::Go => r"^type\s+NAME\s+(?P<kind>struct|interface)\b(?P<rest>.*)$",
        }
    }
}

const GENERIC_FUNCTION_TEMPLATE: &str = r"\b(?:def|fn|func|function|sub|proc)\s+NAME\b";

struct OutlineRules {
    imports: Regex,
    types: Regex,
    functions: Regex,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid outline regex")
}

static RULES: LazyLock<HashMap<Language, OutlineRules>> = LazyLock::new(|| {
    let mut rules = HashMap::new();
    rules.insert(
        Language::Python,
        OutlineRules {
            imports: compile(
                r"^(?:from\s+(?P<from>[\w.]+)\s+import\s+(?P<names>[^#]+)|import\s+(?P<module>[\w., ]+))",
            ),
            types: compile(r"^\s*(?P<kind>class)\s+(?P<name>\w+)"),
            functions: compile(r"^\s*(?:async\s+)?def\s+(?P<name>\w+)\s*\("),
        },
    );
    rules.insert(
        Language::Rust,
        OutlineRules {
            imports: compile(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+(?P<module>[^;]+);"),
            types: compile(
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?P<kind>struct|enum|trait|union|type)\s+(?P<name>\w+)",
            ),
            functions: compile(
                r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe)\s+)*(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>\w+)"#,
            ),
        },
    );
    rules.insert(
        Language::JavaScript,
        OutlineRules {
            imports: compile(
                r#"^\s*import\s+(?:[^'";]*?\s+from\s+)?['"](?P<module>[^'"]+)['"]|require\(\s*['"](?P<req>[^'"]+)['"]\s*\)"#,
            ),
            types: compile(
                r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?:declare\s+)?(?P<kind>class|interface|enum|type)\s+(?P<name>\w+)",
            ),
            functions: compile(
                r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>\w+)|^\s*(?:export\s+)?(?:const|let|var)\s+(?P<arrow>\w+)\s*=\s*(?:async\s+)?(?:\([^)]*\)|\w+)\s*=>|^\s+(?:(?:public|private|protected|static|async|get|set)\s+)*(?P<method>\w+)\s*\([^)]*\)[^;{]*\{",
            ),
        },
    );
    rules.insert(
        Language::Java,
        OutlineRules {
            imports: compile(r"^\s*import\s+(?:static\s+)?(?P<module>[\w.*]+)\s*;"),
            types: compile(
                r"^\s*(?:(?:public|private|protected|static|final|abstract|sealed)\s+)*(?P<kind>class|interface|enum|record)\s+(?P<name>\w+)",
            ),
            functions: compile(
                r"^\s*(?:(?:public|private|protected|static|final|abstract|synchronized|native|default)\s+)*(?:<[^>]+>\s+)?[\w<>\[\],.?]+\s+(?P<name>\w+)\s*\([^;]*$",
            ),
        },
    );
    rules.insert(
        Language::Go,
        OutlineRules {
            imports: compile(r#"^import\s+(?:\w+\s+)?"(?P<module>[^"]+)""#),
            types: compile(r"^type\s+(?P<name>\w+)\s+(?P<kind>struct|interface|\w+)"),
            functions: compile(r"^func\s+(?:\([^)]*\)\s*)?(?P<name>\w+)"),
        },
    );
    rules
});

fn rules(language: Language) -> &'static OutlineRules {
    &RULES[&language]
}

fn first_group<'t>(caps: &Captures<'t>, names: &[&str]) -> Option<&'t str> {
    names
        .iter()
        .find_map(|name| caps.name(name))
        .map(|m| m.as_str())
}

fn function_name<'t>(rules: &OutlineRules, line: &'t str) -> Option<&'t str> {
    let caps = rules.functions.captures(line)?;
    if let Some(name) = first_group(&caps, &["name", "arrow"]) {
        return Some(name);
    }
    // The bare method form also matches control-flow statements like `if (x) {`.
    let method = caps.name("method")?.as_str();
    (!LANGUAGE_KEYWORDS.contains(&method)).then_some(method)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Index of the last line belonging to the definition starting at `start`.
fn block_end(lines: &[&str], start: usize, style: BlockStyle) -> usize {
    let last = lines.len().saturating_sub(1);
    match style {
        BlockStyle::Indent => {
            let base = indent_of(lines[start]);
            let mut header_end = start;
            while header_end < last && !lines[header_end].trim_end().ends_with(':') {
                header_end += 1;
            }
            let mut end = header_end;
            for (idx, line) in lines.iter().enumerate().skip(header_end + 1) {
                if line.trim().is_empty() {
                    continue;
                }
                if indent_of(line) <= base {
                    break;
                }
                end = idx;
            }
            end
        }
        BlockStyle::Braces => {
            let mut depth: i64 = 0;
            let mut opened = false;
            for (idx, line) in lines.iter().enumerate().skip(start) {
                for ch in line.chars() {
                    match ch {
                        '{' => {
                            depth += 1;
                            opened = true;
                        }
                        '}' => depth -= 1,
                        _ => {}
                    }
                }
                if opened && depth <= 0 {
                    return idx;
                }
                if !opened && line.trim_end().ends_with(';') {
                    return idx;
                }
                if !opened && idx >= start + WINDOW_LINES - 1 {
                    return idx;
                }
            }
            last
        }
    }
}

fn window_end(lines: &[&str], start: usize) -> usize {
    (start + WINDOW_LINES - 1).min(lines.len().saturating_sub(1))
}

fn named_pattern(template: &str, name: &str) -> Result<Regex, CapabilityError> {
    Regex::new(&template.replace("NAME", &regex::escape(name)))
        .map_err(|err| CapabilityError::execution(format!("build pattern: {err}")))
}

#[derive(Debug, Deserialize)]
struct OutlineArgs {
    file_path: String,
}

fn get_file_outline(root: &Path, args: &Map<String, Value>) -> CapabilityResult {
    let args: OutlineArgs = parse_args("get_file_outline", args)?;
    let text = read_repo_file(root, &args.file_path)?;
    let Some(language) = Language::detect(&args.file_path) else {
        return Ok(format!(
            "=== Outline: {} ===\nOutline is not supported for this file type.",
            args.file_path
        ));
    };
    Ok(render_outline(&args.file_path, language, &text))
}

fn collect_imports(language: Language, lines: &[&str]) -> Vec<String> {
    let rules = rules(language);
    let mut imports = Vec::new();
    let mut in_go_block = false;
    for line in lines {
        let trimmed = line.trim();
        if language == Language::Go {
            if trimmed.starts_with("import (") {
                in_go_block = true;
                continue;
            }
            if in_go_block {
                if trimmed.starts_with(')') {
                    in_go_block = false;
                } else if let Some(start) = trimmed.find('"')
                    && let Some(len) = trimmed[start + 1..].find('"')
                {
                    imports.push(trimmed[start + 1..start + 1 + len].to_string());
                }
                continue;
            }
        }
        let Some(caps) = rules.imports.captures(line) else {
            continue;
        };
        if let (Some(from), Some(names)) = (caps.name("from"), caps.name("names")) {
            for name in names.as_str().split(',') {
                let name = name.trim().trim_matches(|c| c == '(' || c == ')');
                if !name.is_empty() {
                    imports.push(format!("{}.{name}", from.as_str()));
                }
            }
        } else if language == Language::Python
            && let Some(module) = caps.name("module")
        {
            imports.extend(
                module
                    .as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string),
            );
        } else if let Some(module) = first_group(&caps, &["module", "req"]) {
            imports.push(module.trim().to_string());
        }
    }
    imports
}

struct TypeEntry {
    kind: String,
    name: String,
    line: usize,
    end: usize,
}

fn render_outline(file_path: &str, language: Language, text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let rules = rules(language);
    let style = language.block_style();

    let imports = collect_imports(language, &lines);
    let mut types = Vec::new();
    let mut functions: Vec<(usize, &str)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if let Some(caps) = rules.types.captures(line)
            && let Some(name) = caps.name("name")
        {
            let kind = caps.name("kind").map_or("type", |m| m.as_str());
            let end = if kind == "type" {
                idx
            } else {
                block_end(&lines, idx, style)
            };
            types.push(TypeEntry {
                kind: kind.to_string(),
                name: name.as_str().to_string(),
                line: idx,
                end,
            });
            continue;
        }
        if let Some(name) = function_name(rules, line) {
            functions.push((idx, name));
        }
    }

    let mut out = format!("=== Outline: {file_path} ({}) ===\n", language.label());
    if !imports.is_empty() {
        let _ = writeln!(out, "\n## Imports");
        for import in imports.iter().take(MAX_OUTLINE_IMPORTS) {
            let _ = writeln!(out, "  - {import}");
        }
        if imports.len() > MAX_OUTLINE_IMPORTS {
            let _ = writeln!(
                out,
                "  - ... {} more",
                imports.len() - MAX_OUTLINE_IMPORTS
            );
        }
    }

    let mut members: HashMap<usize, Vec<(usize, &str)>> = HashMap::new();
    let mut free_functions = Vec::new();
    for (line, name) in functions {
        let owner = types
            .iter()
            .enumerate()
            .filter(|(_, t)| t.line < line && line <= t.end)
            .map(|(i, _)| i)
            .next_back();
        match owner {
            Some(owner) => members.entry(owner).or_default().push((line, name)),
            None => free_functions.push((line, name)),
        }
    }

    if !types.is_empty() {
        let _ = writeln!(out, "\n## Types");
        for (i, entry) in types.iter().enumerate() {
            let _ = writeln!(
                out,
                "  - {} {} (line {})",
                entry.kind,
                entry.name,
                entry.line + 1
            );
            for (line, name) in members.get(&i).into_iter().flatten() {
                let _ = writeln!(out, "      - {name} (line {})", line + 1);
            }
        }
    }
    if !free_functions.is_empty() {
        let _ = writeln!(out, "\n## Functions");
        for (line, name) in &free_functions {
            let _ = writeln!(out, "  - {name} (line {})", line + 1);
        }
    }
    if imports.is_empty() && types.is_empty() && free_functions.is_empty() {
        let _ = writeln!(out, "\nNo declarations found.");
    }
    out.trim_end().to_string()
}

#[derive(Debug, Deserialize)]
struct FunctionArgs {
    file_path: String,
    function_name: String,
}

fn get_function_info(root: &Path, args: &Map<String, Value>) -> CapabilityResult {
    let args: FunctionArgs = parse_args("get_function_info", args)?;
    let text = read_repo_file(root, &args.file_path)?;
    let lines: Vec<&str> = text.lines().collect();
    let language = Language::detect(&args.file_path);
    let template = language.map_or(GENERIC_FUNCTION_TEMPLATE, Language::function_template);
    let pattern = named_pattern(template, &args.function_name)?;

    let start = lines
        .iter()
        .position(|line| {
            pattern.is_match(line)
                && !LANGUAGE_KEYWORDS
                    .iter()
                    .any(|kw| line.trim_start().starts_with(&format!("{kw} ")))
        })
        .ok_or_else(|| {
            CapabilityError::execution(format!(
                "function `{}` not found in {}",
                args.function_name, args.file_path
            ))
        })?;
    let end = match language {
        Some(language) => block_end(&lines, start, language.block_style()),
        None => window_end(&lines, start),
    };

    let mut out = format!("=== Function: {} ===\n", args.function_name);
    let _ = writeln!(out, "File: {}", args.file_path);
    let _ = writeln!(out, "Lines: {}-{}", start + 1, end + 1);
    let _ = writeln!(out, "Signature: {}", lines[start].trim());
    let _ = write!(
        out,
        "\n```{}\n{}\n```",
        language.map_or("", Language::fence),
        lines[start..=end].join("\n")
    );
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct ClassArgs {
    file_path: String,
    class_name: String,
}

fn get_class_info(root: &Path, args: &Map<String, Value>) -> CapabilityResult {
    let args: ClassArgs = parse_args("get_class_info", args)?;
    let text = read_repo_file(root, &args.file_path)?;
    let language = Language::detect(&args.file_path).ok_or_else(|| {
        CapabilityError::execution(format!(
            "class lookup is not supported for {}",
            args.file_path
        ))
    })?;
    let lines: Vec<&str> = text.lines().collect();
    let pattern = named_pattern(language.class_template(), &args.class_name)?;

    let (start, caps) = lines
        .iter()
        .enumerate()
        .find_map(|(idx, line)| pattern.captures(line).map(|caps| (idx, caps)))
        .ok_or_else(|| {
            CapabilityError::execution(format!(
                "class `{}` not found in {}",
                args.class_name, args.file_path
            ))
        })?;
    let kind = caps.name("kind").map_or("class", |m| m.as_str());
    let rest = caps.name("rest").map_or("", |m| m.as_str());
    let end = block_end(&lines, start, language.block_style());

    let rules = rules(language);
    let mut bases = parse_bases(language, rest);
    let mut methods: Vec<(usize, String)> = (start + 1..=end)
        .filter_map(|idx| function_name(rules, lines[idx]).map(|name| (idx, name.to_string())))
        .collect();
    extend_external_methods(language, &args.class_name, &lines, &mut bases, &mut methods)?;

    let mut out = format!("=== Class: {} ===\n", args.class_name);
    let _ = writeln!(out, "File: {}", args.file_path);
    let _ = writeln!(out, "Kind: {kind}");
    let _ = writeln!(out, "Lines: {}-{}", start + 1, end + 1);
    if !bases.is_empty() {
        let _ = writeln!(out, "Bases: {}", bases.join(", "));
    }
    if !methods.is_empty() {
        let _ = writeln!(out, "Methods:");
        for (line, name) in &methods {
            let _ = writeln!(out, "  - {name} (line {})", line + 1);
        }
    }
    let _ = write!(
        out,
        "\n```{}\n{}\n```",
        language.fence(),
        lines[start..=end].join("\n")
    );
    Ok(out)
}

/// Methods declared outside the type body: Rust `impl` blocks and Go receivers.
fn extend_external_methods(
    language: Language,
    class_name: &str,
    lines: &[&str],
    bases: &mut Vec<String>,
    methods: &mut Vec<(usize, String)>,
) -> Result<(), CapabilityError> {
    match language {
        Language::Rust => {
            let impl_re = named_pattern(
                r"^\s*impl\b(?:\s*<[^{]*?>)?\s+(?:(?P<trait>[\w:]+(?:<[^>]*>)?)\s+for\s+)?NAME\b",
                class_name,
            )?;
            let rules = rules(language);
            for (idx, line) in lines.iter().enumerate() {
                let Some(caps) = impl_re.captures(line) else {
                    continue;
                };
                if let Some(name) = caps.name("trait") {
                    let name = name.as_str().to_string();
                    if !bases.contains(&name) {
                        bases.push(name);
                    }
                }
                let end = block_end(lines, idx, BlockStyle::Braces);
                methods.extend((idx + 1..=end).filter_map(|i| {
                    function_name(rules, lines[i]).map(|name| (i, name.to_string()))
                }));
            }
        }
        Language::Go => {
            let receiver_re = named_pattern(
                r"^func\s+\(\s*\w*\s*\*?NAME\b[^)]*\)\s*(?P<name>\w+)",
                class_name,
            )?;
            for (idx, line) in lines.iter().enumerate() {
                if let Some(name) = receiver_re.captures(line).and_then(|c| c.name("name")) {
                    methods.push((idx, name.as_str().to_string()));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_bases(language: Language, rest: &str) -> Vec<String> {
    let split = |text: &str, sep: char| -> Vec<String> {
        text.split(sep)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };
    match language {
        Language::Python => {
            let rest = rest.trim();
            match (rest.strip_prefix('('), rest.find(')')) {
                (Some(_), Some(close)) => split(&rest[1..close], ','),
                _ => Vec::new(),
            }
        }
        Language::Rust => {
            let rest = skip_generics(rest.trim());
            let Some(bounds) = rest.strip_prefix(':') else {
                return Vec::new();
            };
            let bounds = bounds
                .split(['{', ';'])
                .next()
                .unwrap_or_default()
                .split(" where ")
                .next()
                .unwrap_or_default();
            split(bounds, '+')
        }
        Language::JavaScript | Language::Java => {
            let head = rest.split('{').next().unwrap_or_default();
            let mut bases = Vec::new();
            let mut collecting = false;
            for token in head.split(|c: char| c.is_whitespace() || c == ',') {
                match token {
                    "" => {}
                    "extends" | "implements" => collecting = true,
                    _ if collecting => bases.push(token.to_string()),
                    _ => {}
                }
            }
            bases
        }
        Language::Go => Vec::new(),
    }
}

fn skip_generics(text: &str) -> &str {
    if !text.starts_with('<') {
        return text;
    }
    let mut depth = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return text[idx + 1..].trim_start();
                }
            }
            _ => {}
        }
    }
    ""
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    const PYTHON: &str = r#"import os
from typing import Optional, List

class Store(Base, Mixin):
    """Keeps things."""

    def __init__(self, path):
        self.path = path

    def load(self) -> Optional[str]:
        if os.path.exists(self.path):
            return open(self.path).read()
        return None


def main(
    argv,
):
    store = Store("x")
    return store.load()
"#;

    const RUST: &str = r#"use std::fmt;
use crate::core::state::RunState;

pub struct Engine<T> {
    inner: T,
}

impl<T> Engine<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl fmt::Display for Engine<u8> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine")
    }
}

pub(crate) async fn run() -> u32 {
    if true {
        1
    } else {
        2
    }
}
"#;

    fn fixture() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        fs::write(temp.path().join("src/store.py"), PYTHON).expect("write");
        fs::write(temp.path().join("src/engine.rs"), RUST).expect("write");
        fs::write(temp.path().join("src/notes.txt"), "def nothing").expect("write");
        temp
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn python_outline_groups_methods_under_classes() {
        let temp = fixture();
        let out = get_file_outline(temp.path(), &args(json!({"file_path": "src/store.py"})))
            .expect("outline");
        assert!(out.starts_with("=== Outline: src/store.py (Python) ==="));
        assert!(out.contains("  - os\n"));
        assert!(out.contains("  - typing.Optional\n  - typing.List"));
        assert!(out.contains("  - class Store (line 4)\n      - __init__ (line 7)\n      - load (line 10)"));
        assert!(out.contains("## Functions\n  - main (line 16)"));
    }

    #[test]
    fn rust_outline_lists_uses_types_and_functions() {
        let temp = fixture();
        let out = get_file_outline(temp.path(), &args(json!({"file_path": "src/engine.rs"})))
            .expect("outline");
        assert!(out.contains("  - std::fmt"));
        assert!(out.contains("  - struct Engine (line 4)"));
        assert!(out.contains("  - new (line 9)"));
        assert!(out.contains("  - run (line 20)"));
    }

    #[test]
    fn keyword_filter_only_applies_to_bare_js_methods() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("make.py"), "def new(kind):\n    return kind\n").expect("write");
        fs::write(
            temp.path().join("cart.js"),
            "class Cart {\n  add(item) {\n    if (item) {\n      return 1;\n    }\n  }\n}\n",
        )
        .expect("write");

        let python = get_file_outline(temp.path(), &args(json!({"file_path": "make.py"})))
            .expect("outline");
        assert!(python.contains("  - new (line 1)"));

        let js = get_file_outline(temp.path(), &args(json!({"file_path": "cart.js"})))
            .expect("outline");
        assert!(js.contains("add (line 2)"));
        assert!(!js.contains("- if "));
    }

    #[test]
    fn unsupported_outline_is_not_an_error() {
        let temp = fixture();
        let out = get_file_outline(temp.path(), &args(json!({"file_path": "src/notes.txt"})))
            .expect("outline");
        assert!(out.contains("not supported"));
    }

    #[test]
    fn python_function_spans_multiline_signature_and_body() {
        let temp = fixture();
        let out = get_function_info(
            temp.path(),
            &args(json!({"file_path": "src/store.py", "function_name": "main"})),
        )
        .expect("function");
        assert!(out.contains("Lines: 16-20"));
        assert!(out.contains("return store.load()"));

        let method = get_function_info(
            temp.path(),
            &args(json!({"file_path": "src/store.py", "function_name": "load"})),
        )
        .expect("method");
        assert!(method.contains("Lines: 10-13"));
    }

    #[test]
    fn rust_function_uses_brace_matching() {
        let temp = fixture();
        let out = get_function_info(
            temp.path(),
            &args(json!({"file_path": "src/engine.rs", "function_name": "run"})),
        )
        .expect("function");
        assert!(out.contains("Lines: 20-26"));
        assert!(out.contains("```rust"));
    }

    #[test]
    fn missing_function_is_an_execution_error() {
        let temp = fixture();
        let err = get_function_info(
            temp.path(),
            &args(json!({"file_path": "src/store.py", "function_name": "absent"})),
        )
        .expect_err("missing");
        assert!(matches!(err, CapabilityError::Execution(_)));
    }

    #[test]
    fn python_class_info_reports_bases_and_methods() {
        let temp = fixture();
        let out = get_class_info(
            temp.path(),
            &args(json!({"file_path": "src/store.py", "class_name": "Store"})),
        )
        .expect("class");
        assert!(out.contains("Bases: Base, Mixin"));
        assert!(out.contains("  - __init__ (line 7)\n  - load (line 10)"));
        assert!(out.contains("Lines: 4-13"));
    }

    #[test]
    fn rust_class_info_collects_impl_blocks() {
        let temp = fixture();
        let out = get_class_info(
            temp.path(),
            &args(json!({"file_path": "src/engine.rs", "class_name": "Engine"})),
        )
        .expect("class");
        assert!(out.contains("Kind: struct"));
        assert!(out.contains("Bases: fmt::Display"));
        assert!(out.contains("  - new (line 9)"));
        assert!(out.contains("  - fmt (line 15)"));
    }

    #[test]
    fn class_info_rejects_unsupported_files() {
        let temp = fixture();
        let err = get_class_info(
            temp.path(),
            &args(json!({"file_path": "src/notes.txt", "class_name": "X"})),
        )
        .expect_err("unsupported");
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn bases_parse_for_brace_languages() {
        assert_eq!(
            parse_bases(Language::Java, " extends Base implements Runnable, Closeable {"),
            vec!["Base", "Runnable", "Closeable"]
        );
        assert_eq!(
            parse_bases(Language::Rust, "<T>: Clone + Send {"),
            vec!["Clone", "Send"]
        );
    }
}
