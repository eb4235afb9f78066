//! Seed evidence: a one-time, high-level survey of the repository.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::capabilities::walk;
use crate::core::evidence::truncate_chars;
use crate::core::state::SeedEvidence;

const README_CANDIDATES: &[&str] = &["README.md", "readme.md", "README.rst", "README.txt", "README"];
const README_CHARS: usize = 10_000;
const README_SUMMARY_CHARS: usize = 3_000;
const MANIFEST_CHARS: usize = 3_000;
const TREE_DEPTH: usize = 3;

const PROJECT_FILES: &[&str] = &[
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "requirements.txt",
    "Pipfile",
    "package.json",
    "package-lock.json",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "Cargo.toml",
    "go.mod",
    "go.sum",
    "Gemfile",
    "composer.json",
    "Makefile",
    "CMakeLists.txt",
    ".env.example",
    ".env.sample",
    "docker-compose.yml",
    "Dockerfile",
];

/// Manifests whose contents are quoted in the summary.
const KEY_MANIFESTS: &[&str] = &[
    "pyproject.toml",
    "package.json",
    "pom.xml",
    "build.gradle",
    "Cargo.toml",
    "go.mod",
];

const DOC_DIRS: &[&str] = &["docs", "doc", "documentation", "wiki"];

const SOURCE_LANGUAGES: &[(&str, &str)] = &[
    (".py", "Python"),
    (".js", "JavaScript"),
    (".jsx", "JavaScript (React)"),
    (".ts", "TypeScript"),
    (".tsx", "TypeScript (React)"),
    (".java", "Java"),
    (".go", "Go"),
    (".rs", "Rust"),
    (".c", "C"),
    (".h", "C/C++ Header"),
    (".cpp", "C++"),
    (".hpp", "C++ Header"),
    (".cs", "C#"),
    (".rb", "Ruby"),
    (".php", "PHP"),
    (".swift", "Swift"),
    (".kt", "Kotlin"),
    (".scala", "Scala"),
    (".vue", "Vue"),
    (".svelte", "Svelte"),
];

fn language_of(extension: &str) -> Option<&'static str> {
    SOURCE_LANGUAGES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, language)| *language)
}

/// Survey `root`. Fails only when the root is missing, not a directory, or unreadable.
pub fn collect_seed(root: &Path) -> Result<SeedEvidence> {
    if !root.exists() {
        bail!("repository path does not exist: {}", root.display());
    }
    if !root.is_dir() {
        bail!("repository path is not a directory: {}", root.display());
    }
    fs::read_dir(root).with_context(|| format!("read repository {}", root.display()))?;
    info!(root = %root.display(), "collecting seed evidence");

    let readme = read_readme(root);
    let directory_tree = walk::render_tree(root, TREE_DEPTH, true)?;
    let project_files = project_files(root);
    let manifests = key_manifests(root, &project_files);
    let extension_counts = count_source_extensions(root);
    let dominant_extension = dominant_extension(&extension_counts);
    debug!(
        project_files = project_files.len(),
        dominant = ?dominant_extension,
        "seed evidence collected"
    );

    let summary = render_summary(
        readme.as_deref(),
        &directory_tree,
        &project_files,
        &manifests,
        &extension_counts,
    );
    Ok(SeedEvidence {
        summary,
        directory_tree,
        project_files,
        dominant_extension,
    })
}

fn read_readme(root: &Path) -> Option<String> {
    for candidate in README_CANDIDATES {
        let path = root.join(candidate);
        if !path.is_file() {
            continue;
        }
        match fs::read(&path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                return Some(truncate_chars(&text, README_CHARS));
            }
            Err(err) => warn!(path = %path.display(), err = %err, "failed to read README"),
        }
    }
    None
}

fn project_files(root: &Path) -> Vec<String> {
    let mut found: Vec<String> = PROJECT_FILES
        .iter()
        .filter(|name| root.join(name).is_file())
        .map(|name| name.to_string())
        .collect();
    found.extend(
        DOC_DIRS
            .iter()
            .filter(|dir| root.join(dir).is_dir())
            .map(|dir| format!("{dir}/")),
    );
    found
}

fn key_manifests(root: &Path, project_files: &[String]) -> Vec<(String, String)> {
    project_files
        .iter()
        .filter(|name| KEY_MANIFESTS.contains(&name.as_str()))
        .filter_map(|name| {
            let path = root.join(name);
            match fs::read(&path) {
                Ok(bytes) => Some((
                    name.clone(),
                    truncate_chars(&String::from_utf8_lossy(&bytes), MANIFEST_CHARS),
                )),
                Err(err) => {
                    warn!(path = %path.display(), err = %err, "failed to read manifest");
                    None
                }
            }
        })
        .collect()
}

fn count_source_extensions(root: &Path) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for path in walk::repo_files(root) {
        if let Some(ext) = walk::dotted_extension(&path)
            && language_of(&ext).is_some()
        {
            *counts.entry(ext).or_insert(0) += 1;
        }
    }
    counts
}

/// Most frequent source extension; ties resolve to the lexicographically first.
fn dominant_extension(counts: &BTreeMap<String, usize>) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for (ext, count) in counts {
        if best.is_none_or(|(_, best_count)| *count > best_count) {
            best = Some((ext, *count));
        }
    }
    best.map(|(ext, _)| ext.clone())
}

fn render_summary(
    readme: Option<&str>,
    tree: &str,
    project_files: &[String],
    manifests: &[(String, String)],
    extension_counts: &BTreeMap<String, usize>,
) -> String {
    let mut out = String::from("# Repository overview\n\n## README\n\n");
    match readme {
        Some(text) => out.push_str(&truncate_chars(text.trim(), README_SUMMARY_CHARS)),
        None => out.push_str("(no README found)"),
    }

    let _ = write!(out, "\n\n## Directory structure\n\n```\n{tree}\n```\n");

    out.push_str("\n## Project files\n\n");
    if project_files.is_empty() {
        out.push_str("(none found)\n");
    }
    for file in project_files {
        let _ = writeln!(out, "- {file}");
    }

    if !extension_counts.is_empty() {
        out.push_str("\n## Languages\n\n");
        let mut by_count: Vec<_> = extension_counts.iter().collect();
        by_count.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (ext, count) in by_count {
            let language = language_of(ext).unwrap_or("Unknown");
            let _ = writeln!(out, "- {language} ({ext}): {count} files");
        }
    }

    if !manifests.is_empty() {
        out.push_str("\n## Key manifests\n");
        for (name, content) in manifests {
            let _ = write!(out, "\n### {name}\n\n```\n{}\n```\n", content.trim_end());
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = collect_seed(&temp.path().join("absent")).expect_err("missing");
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn file_root_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").expect("write");
        assert!(collect_seed(&file).is_err());
    }

    #[test]
    fn seed_collects_readme_manifests_and_languages() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::create_dir_all(root.join("docs")).expect("mkdir");
        fs::write(root.join("README.md"), "# Shop\nAn online shop.").expect("write");
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"shop\"\n").expect("write");
        fs::write(root.join("src/main.rs"), "fn main() {}").expect("write");
        fs::write(root.join("src/cart.rs"), "pub struct Cart;").expect("write");
        fs::write(root.join("src/script.py"), "print(1)").expect("write");

        let seed = collect_seed(root).expect("seed");
        assert_eq!(seed.project_files, vec!["Cargo.toml", "docs/"]);
        assert_eq!(seed.dominant_extension.as_deref(), Some(".rs"));
        assert!(seed.directory_tree.contains("src/"));
        assert!(seed.summary.contains("An online shop."));
        assert!(seed.summary.contains("### Cargo.toml"));
        assert!(seed.summary.contains("- Rust (.rs): 2 files\n- Python (.py): 1 files"));
    }

    #[test]
    fn empty_repository_has_no_dominant_extension() {
        let temp = tempfile::tempdir().expect("tempdir");
        let seed = collect_seed(temp.path()).expect("seed");
        assert_eq!(seed.dominant_extension, None);
        assert!(seed.summary.contains("(no README found)"));
    }

    #[test]
    fn dominant_extension_breaks_ties_lexicographically() {
        let counts: BTreeMap<String, usize> =
            [(".py".to_string(), 2), (".go".to_string(), 2)].into_iter().collect();
        assert_eq!(dominant_extension(&counts).as_deref(), Some(".go"));
    }
}
