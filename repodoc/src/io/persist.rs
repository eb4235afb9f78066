//! Writing run outputs: the artifact, a report, a state snapshot and
//! (optionally) every intermediate artifact version.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::core::report::{ReportSettings, render_report};
use crate::core::state::RunState;
use crate::io::config::OutputConfig;

/// Files written for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistedPaths {
    pub artifact: PathBuf,
    pub timestamped_artifact: PathBuf,
    pub report: PathBuf,
    pub snapshot: PathBuf,
    pub intermediate: Vec<PathBuf>,
}

/// Destination for the outputs of a finished run.
pub trait ArtifactSink {
    fn persist(&self, state: &RunState) -> Result<PersistedPaths>;
}

/// Writes outputs under the configured output directory.
pub struct FsArtifactSink {
    output: OutputConfig,
    settings: ReportSettings,
}

impl FsArtifactSink {
    pub fn new(output: OutputConfig, settings: ReportSettings) -> Self {
        Self { output, settings }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

impl ArtifactSink for FsArtifactSink {
    fn persist(&self, state: &RunState) -> Result<PersistedPaths> {
        let dir = self.output.resolve_dir(&state.repo_path);
        fs::create_dir_all(&dir).with_context(|| format!("create directory {}", dir.display()))?;

        let now = Local::now();
        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let filename = &self.output.filename;

        let artifact = dir.join(filename);
        write_file(&artifact, &state.artifact)?;
        let timestamped_artifact = dir.join(format!("{stamp}_{filename}"));
        write_file(&timestamped_artifact, &state.artifact)?;

        let report = dir.join(format!("{stamp}_report.md"));
        let generated_at = now.format("%Y-%m-%d %H:%M:%S").to_string();
        write_file(&report, &render_report(state, &generated_at, &self.settings))?;

        let snapshot = dir.join("run.json");
        let mut json = serde_json::to_string_pretty(state).context("serialize run state")?;
        json.push('\n');
        write_file(&snapshot, &json)?;

        let mut intermediate = Vec::new();
        if self.output.save_intermediate {
            let versions_dir = dir.join("intermediate");
            fs::create_dir_all(&versions_dir)
                .with_context(|| format!("create directory {}", versions_dir.display()))?;
            for (idx, version) in state.artifact_versions.iter().enumerate() {
                let path = versions_dir.join(format!("version_{}.md", idx + 1));
                write_file(&path, version)?;
                intermediate.push(path);
            }
        }

        info!(dir = %dir.display(), versions = intermediate.len(), "run outputs written");
        Ok(PersistedPaths {
            artifact,
            timestamped_artifact,
            report,
            snapshot,
            intermediate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::machine::Phase;

    fn settings() -> ReportSettings {
        ReportSettings {
            oracle: "scripted".to_string(),
            max_iterations: 3,
            max_tool_calls_per_iteration: 2,
        }
    }

    fn finished_state(root: &Path) -> RunState {
        let mut state = RunState::new(root, 3);
        state.phase = Phase::Persist;
        state.iteration_count = 2;
        state.artifact_versions = vec!["# v1".to_string(), "# v2".to_string()];
        state.artifact = "# v2".to_string();
        state.confidence = Some(0.9);
        state
    }

    #[test]
    fn writes_artifact_report_snapshot_and_versions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sink = FsArtifactSink::new(OutputConfig::default(), settings());
        let paths = sink.persist(&finished_state(temp.path())).expect("persist");

        let out_dir = temp.path().join("repodoc-output");
        assert_eq!(paths.artifact, out_dir.join("requirements.md"));
        assert_eq!(fs::read_to_string(&paths.artifact).expect("read"), "# v2");
        assert_eq!(fs::read_to_string(&paths.timestamped_artifact).expect("read"), "# v2");
        assert!(
            fs::read_to_string(&paths.report)
                .expect("read")
                .contains("- Artifact versions: 2")
        );
        let snapshot: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.snapshot).expect("read"))
                .expect("json");
        assert_eq!(snapshot["iteration_count"], 2);
        assert_eq!(paths.intermediate.len(), 2);
        assert_eq!(
            fs::read_to_string(out_dir.join("intermediate/version_1.md")).expect("read"),
            "# v1"
        );
    }

    #[test]
    fn intermediate_versions_are_optional() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = OutputConfig {
            output_dir: temp.path().join("custom"),
            save_intermediate: false,
            ..OutputConfig::default()
        };
        let sink = FsArtifactSink::new(output, settings());
        let paths = sink.persist(&finished_state(temp.path())).expect("persist");
        assert!(paths.intermediate.is_empty());
        assert!(!temp.path().join("custom/intermediate").exists());
        assert!(paths.artifact.starts_with(temp.path().join("custom")));
    }

    #[test]
    fn unwritable_destination_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("blocked");
        fs::write(&blocker, "not a directory").expect("write");
        let output = OutputConfig {
            output_dir: blocker,
            ..OutputConfig::default()
        };
        let sink = FsArtifactSink::new(output, settings());
        assert!(sink.persist(&finished_state(temp.path())).is_err());
    }
}
