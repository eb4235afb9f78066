//! File and directory capabilities.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::walk::{self, dotted_extension};
use super::{
    CapabilityError, CapabilityResult, CapabilitySpec, Param, ParamKind, parse_args,
    resolve_in_root,
};

pub const MAX_FILE_BYTES: u64 = 100 * 1024;
const DEFAULT_TREE_DEPTH: usize = 3;
const DEFAULT_MAX_FILES: usize = 50;

pub(super) fn specs() -> Vec<CapabilitySpec> {
    vec![
        CapabilitySpec {
            name: "get_file_content",
            description: "Read the full text of one file (at most 100 KiB).",
            params: vec![Param::required(
                "file_path",
                ParamKind::String,
                "path relative to the repository root",
            )],
            handler: get_file_content,
        },
        CapabilitySpec {
            name: "get_directory_tree",
            description: "Show the repository directory structure as a tree.",
            params: vec![
                Param::optional("max_depth", ParamKind::Integer, "maximum depth", Some("3")),
                Param::optional(
                    "include_files",
                    ParamKind::Boolean,
                    "list files as well as directories",
                    Some("true"),
                ),
            ],
            handler: get_directory_tree,
        },
        CapabilitySpec {
            name: "list_files_by_extension",
            description: "List repository files with a given extension.",
            params: vec![
                Param::required(
                    "extension",
                    ParamKind::String,
                    "file extension such as .py or rs",
                ),
                Param::optional(
                    "max_files",
                    ParamKind::Integer,
                    "maximum number of paths",
                    Some("50"),
                ),
            ],
            handler: list_files_by_extension,
        },
    ]
}

#[derive(Debug, Deserialize)]
struct FileContentArgs {
    file_path: String,
}

fn get_file_content(root: &Path, args: &Map<String, Value>) -> CapabilityResult {
    let args: FileContentArgs = parse_args("get_file_content", args)?;
    let text = read_repo_file(root, &args.file_path)?;
    Ok(format!("=== File: {} ===\n{text}", args.file_path))
}

/// Read a repository file as lossy UTF-8, enforcing the size cap.
pub(crate) fn read_repo_file(root: &Path, file_path: &str) -> Result<String, CapabilityError> {
    let path = resolve_in_root(root, file_path)?;
    let metadata = fs::metadata(&path)
        .map_err(|_| CapabilityError::execution(format!("file not found: {file_path}")))?;
    if !metadata.is_file() {
        return Err(CapabilityError::execution(format!(
            "not a file: {file_path}"
        )));
    }
    if metadata.len() > MAX_FILE_BYTES {
        return Err(CapabilityError::execution(format!(
            "file too large ({} bytes, limit {MAX_FILE_BYTES}): {file_path}",
            metadata.len()
        )));
    }
    let bytes = fs::read(&path)
        .map_err(|err| CapabilityError::execution(format!("read {file_path}: {err}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Deserialize)]
struct TreeArgs {
    #[serde(default = "default_tree_depth")]
    max_depth: usize,
    #[serde(default = "default_true")]
    include_files: bool,
}

fn default_tree_depth() -> usize {
    DEFAULT_TREE_DEPTH
}

fn default_true() -> bool {
    true
}

fn get_directory_tree(root: &Path, args: &Map<String, Value>) -> CapabilityResult {
    let args: TreeArgs = parse_args("get_directory_tree", args)?;
    walk::render_tree(root, args.max_depth, args.include_files)
        .map_err(|err| CapabilityError::execution(format!("{err:#}")))
}

#[derive(Debug, Deserialize)]
struct ExtensionArgs {
    extension: String,
    #[serde(default = "default_max_files")]
    max_files: usize,
}

fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

fn list_files_by_extension(root: &Path, args: &Map<String, Value>) -> CapabilityResult {
    let args: ExtensionArgs = parse_args("list_files_by_extension", args)?;
    let wanted = normalize_extension(&args.extension);

    let mut files = Vec::new();
    for path in walk::repo_files(root) {
        if dotted_extension(&path).as_deref() == Some(wanted.as_str()) {
            files.push(walk::relative(root, &path));
            if files.len() >= args.max_files {
                break;
            }
        }
    }

    if files.is_empty() {
        return Ok(format!("No files with extension {wanted} found."));
    }
    let mut out = format!("=== Files with extension {wanted} ({}) ===\n", files.len());
    out.push_str(&files.join("\n"));
    if files.len() >= args.max_files {
        out.push_str(&format!(
            "\n\n(limit of {} files reached; more may exist)",
            args.max_files
        ));
    }
    Ok(out)
}

fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('*').to_ascii_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn fixture() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("pkg")).expect("mkdir");
        fs::write(root.join("pkg/a.py"), "def a():\n    return 1\n").expect("write");
        fs::write(root.join("pkg/b.py"), "").expect("write");
        fs::write(root.join("notes.txt"), "hello").expect("write");
        temp
    }

    #[test]
    fn file_content_has_header() {
        let temp = fixture();
        let out = get_file_content(temp.path(), &args(json!({"file_path": "notes.txt"})))
            .expect("content");
        assert_eq!(out, "=== File: notes.txt ===\nhello");
    }

    #[test]
    fn file_content_fails_for_missing_and_oversized_files() {
        let temp = fixture();
        let missing = get_file_content(temp.path(), &args(json!({"file_path": "nope.py"})))
            .expect_err("missing");
        assert!(missing.to_string().contains("file not found"));

        fs::write(temp.path().join("big.txt"), vec![b'a'; 100 * 1024 + 1]).expect("write");
        let big = get_file_content(temp.path(), &args(json!({"file_path": "big.txt"})))
            .expect_err("too large");
        assert!(big.to_string().contains("too large"));
    }

    #[test]
    fn extension_listing_accepts_missing_dot_and_caps_results() {
        let temp = fixture();
        let out = list_files_by_extension(temp.path(), &args(json!({"extension": "py"})))
            .expect("list");
        assert!(out.contains("pkg/a.py\npkg/b.py"));

        let capped = list_files_by_extension(
            temp.path(),
            &args(json!({"extension": ".py", "max_files": 1})),
        )
        .expect("list");
        assert!(capped.contains("pkg/a.py"));
        assert!(!capped.contains("pkg/b.py"));
        assert!(capped.contains("limit of 1 files reached"));
    }

    #[test]
    fn extension_listing_reports_no_match() {
        let temp = fixture();
        let out = list_files_by_extension(temp.path(), &args(json!({"extension": ".go"})))
            .expect("list");
        assert_eq!(out, "No files with extension .go found.");
    }

    #[test]
    fn directory_tree_defaults() {
        let temp = fixture();
        let out = get_directory_tree(temp.path(), &Map::new()).expect("tree");
        assert!(out.contains("├── pkg/"));
        assert!(out.contains("└── notes.txt"));
    }
}
