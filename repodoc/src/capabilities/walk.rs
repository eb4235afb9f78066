//! Repository traversal shared by capabilities and seed collection.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
    "target",
    ".idea",
    ".vscode",
    "repodoc-output",
];

pub fn is_excluded_dir(name: &str) -> bool {
    DEFAULT_EXCLUDED_DIRS.contains(&name)
}

fn keep(entry: &DirEntry) -> bool {
    entry.depth() == 0
        || !entry.file_type().is_dir()
        || !is_excluded_dir(&entry.file_name().to_string_lossy())
}

/// Regular files under `root` in file-name order, excluded directories pruned.
pub fn repo_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep)
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
}

/// `path` relative to `root`, with forward slashes.
pub fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lowercased extension with a leading dot.
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
}

/// Render an indented tree of `root`, directories first, names compared case-insensitively.
pub fn render_tree(root: &Path, max_depth: usize, include_files: bool) -> Result<String> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    let mut lines = vec![format!("{name}/")];
    push_children(root, "", 1, max_depth, include_files, &mut lines)
        .with_context(|| format!("read directory {}", root.display()))?;
    Ok(lines.join("\n"))
}

fn push_children(
    dir: &Path,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    include_files: bool,
    lines: &mut Vec<String>,
) -> std::io::Result<()> {
    if depth > max_depth {
        return Ok(());
    }
    let mut entries: Vec<(bool, String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = file_type.is_dir();
        if is_dir && is_excluded_dir(&name) {
            continue;
        }
        if !is_dir && !include_files {
            continue;
        }
        entries.push((is_dir, name, entry.path()));
    }
    entries.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
    });

    let count = entries.len();
    for (idx, (is_dir, name, path)) in entries.into_iter().enumerate() {
        let last = idx + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        if is_dir {
            lines.push(format!("{prefix}{connector}{name}/"));
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            // Unreadable subdirectories are shown but not expanded.
            let _ = push_children(&path, &child_prefix, depth + 1, max_depth, include_files, lines);
        } else {
            lines.push(format!("{prefix}{connector}{name}"));
        }
    }
    Ok(())
}
