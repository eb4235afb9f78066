//! Text search capabilities.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::files::MAX_FILE_BYTES;
use super::walk::{self, dotted_extension};
use super::{CapabilityError, CapabilityResult, CapabilitySpec, Param, ParamKind, parse_args};

const DEFAULT_MAX_RESULTS: usize = 20;
const MAX_LINE_CHARS: usize = 100;
const MAX_IMPORTS_PER_FILE: usize = 3;
const BINARY_SNIFF_BYTES: usize = 8000;

pub(super) fn specs() -> Vec<CapabilitySpec> {
    vec![
        CapabilitySpec {
            name: "search_code",
            description: "Case-insensitive search for a text fragment across repository files.",
            params: vec![
                Param::required("query", ParamKind::String, "text to look for"),
                Param::optional(
                    "file_pattern",
                    ParamKind::String,
                    "glob restricting searched files, e.g. *.py or src/**/*.rs",
                    None,
                ),
                Param::optional(
                    "max_results",
                    ParamKind::Integer,
                    "maximum number of matching lines",
                    Some("20"),
                ),
            ],
            handler: search_code,
        },
        CapabilitySpec {
            name: "search_imports",
            description: "Find files that import a module (Python, JavaScript/TypeScript, Rust).",
            params: vec![
                Param::required("module_name", ParamKind::String, "module or crate name"),
                Param::optional(
                    "max_results",
                    ParamKind::Integer,
                    "maximum number of files",
                    Some("20"),
                ),
            ],
            handler: search_imports,
        },
    ]
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

/// Read a text file for searching; binary and oversized files yield `None`.
fn read_searchable(path: &Path) -> Option<String> {
    let metadata = fs::metadata(path).ok()?;
    if metadata.len() > MAX_FILE_BYTES {
        return None;
    }
    let bytes = fs::read(path).ok()?;
    if bytes.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0) {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn clip(line: &str, max_chars: usize) -> String {
    let trimmed = line.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    file_pattern: Option<String>,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

/// Matches either the file name or the repository-relative path.
struct FileFilter {
    matcher: GlobMatcher,
}

impl FileFilter {
    fn new(pattern: &str) -> Result<Self, CapabilityError> {
        let matcher = GlobBuilder::new(pattern.trim())
            .literal_separator(false)
            .build()
            .map_err(|err| CapabilityError::InvalidArguments {
                name: "search_code".to_string(),
                message: format!("invalid file_pattern: {err}"),
            })?
            .compile_matcher();
        Ok(Self { matcher })
    }

    fn accepts(&self, relative: &str) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        self.matcher.is_match(relative) || self.matcher.is_match(name)
    }
}

fn search_code(root: &Path, args: &Map<String, Value>) -> CapabilityResult {
    let args: SearchArgs = parse_args("search_code", args)?;
    let needle = args.query.to_lowercase();
    if needle.trim().is_empty() {
        return Err(CapabilityError::InvalidArguments {
            name: "search_code".to_string(),
            message: "query must not be blank".to_string(),
        });
    }
    let filter = args
        .file_pattern
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(FileFilter::new)
        .transpose()?;

    let mut hits: Vec<(String, usize, String)> = Vec::new();
    'files: for path in walk::repo_files(root) {
        let relative = walk::relative(root, &path);
        if let Some(filter) = &filter
            && !filter.accepts(&relative)
        {
            continue;
        }
        let Some(text) = read_searchable(&path) else {
            continue;
        };
        for (idx, line) in text.lines().enumerate() {
            if line.to_lowercase().contains(&needle) {
                hits.push((relative.clone(), idx + 1, clip(line, MAX_LINE_CHARS)));
                if hits.len() >= args.max_results {
                    break 'files;
                }
            }
        }
    }

    if hits.is_empty() {
        return Ok(format!("No matches for \"{}\".", args.query));
    }
    let mut out = format!(
        "=== Matches for \"{}\" ({}) ===\n",
        args.query,
        hits.len()
    );
    for (file, line, content) in &hits {
        let _ = write!(out, "\n{file}:{line}\n  {content}\n");
    }
    if hits.len() >= args.max_results {
        let _ = write!(
            out,
            "\n(limit of {} results reached; more may exist)",
            args.max_results
        );
    }
    Ok(out.trim_end().to_string())
}

#[derive(Debug, Deserialize)]
struct ImportArgs {
    module_name: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn import_patterns(extension: &str, module: &str) -> Option<Vec<String>> {
    let m = regex::escape(module);
    let patterns = match extension {
        ".py" | ".pyi" => vec![
            format!(r"(?m)^\s*import\s+{m}\b.*$"),
            format!(r"(?m)^\s*from\s+{m}(?:\.[\w.]+)?\s+import\b.*$"),
            format!(r"(?m)^\s*from\s+\S+\s+import\s+.*\b{m}\b.*$"),
        ],
        ".js" | ".jsx" | ".mjs" | ".cjs" | ".ts" | ".tsx" => vec![
            format!(r#"(?m)^\s*import\s+.*['"][^'"]*{m}[^'"]*['"].*$"#),
            format!(r#"(?m)^.*require\s*\(\s*['"][^'"]*{m}[^'"]*['"]\s*\).*$"#),
        ],
        ".rs" => vec![
            format!(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+(?:::)?{m}\b.*$"),
            format!(r"(?m)^\s*extern\s+crate\s+{m}\b.*$"),
        ],
        _ => return None,
    };
    Some(patterns)
}

fn search_imports(root: &Path, args: &Map<String, Value>) -> CapabilityResult {
    let args: ImportArgs = parse_args("search_imports", args)?;
    let module = args.module_name.trim();
    if module.is_empty() {
        return Err(CapabilityError::InvalidArguments {
            name: "search_imports".to_string(),
            message: "module_name must not be blank".to_string(),
        });
    }

    let mut compiled: Vec<(&'static str, Vec<Regex>)> = Vec::new();
    for extension in [".py", ".js", ".rs"] {
        let patterns = import_patterns(extension, module).unwrap_or_default();
        let regexes = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CapabilityError::execution(format!("build pattern: {err}")))?;
        compiled.push((extension, regexes));
    }
    let family = |ext: &str| -> Option<&'static str> {
        match ext {
            ".py" | ".pyi" => Some(".py"),
            ".js" | ".jsx" | ".mjs" | ".cjs" | ".ts" | ".tsx" => Some(".js"),
            ".rs" => Some(".rs"),
            _ => None,
        }
    };

    let mut results: Vec<(String, Vec<String>)> = Vec::new();
    for path in walk::repo_files(root) {
        let Some(key) = dotted_extension(&path).as_deref().and_then(family) else {
            continue;
        };
        let Some((_, regexes)) = compiled.iter().find(|(ext, _)| *ext == key) else {
            continue;
        };
        let Some(text) = read_searchable(&path) else {
            continue;
        };
        let lines: Vec<String> = regexes
            .iter()
            .find_map(|re| {
                let found: Vec<String> = re
                    .find_iter(&text)
                    .take(MAX_IMPORTS_PER_FILE)
                    .map(|m| clip(m.as_str(), MAX_LINE_CHARS))
                    .collect();
                (!found.is_empty()).then_some(found)
            })
            .unwrap_or_default();
        if lines.is_empty() {
            continue;
        }
        results.push((walk::relative(root, &path), lines));
        if results.len() >= args.max_results {
            break;
        }
    }

    if results.is_empty() {
        return Ok(format!("No files import \"{module}\"."));
    }
    let mut out = format!("=== Files importing \"{module}\" ({}) ===\n", results.len());
    for (file, lines) in &results {
        let _ = write!(out, "\n{file}\n");
        for line in lines {
            let _ = writeln!(out, "  {line}");
        }
    }
    if results.len() >= args.max_results {
        let _ = write!(
            out,
            "\n(limit of {} files reached; more may exist)",
            args.max_results
        );
    }
    Ok(out.trim_end().to_string())
}
