//! Test-only doubles for the oracle and artifact sink, plus fixture repositories.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::state::RunState;
use crate::io::oracle::{Oracle, OracleMode, OracleRequest};
use crate::io::persist::{ArtifactSink, PersistedPaths};

#[derive(Default)]
struct Script {
    queues: HashMap<OracleMode, VecDeque<Result<String, String>>>,
    repeats: HashMap<OracleMode, String>,
    requests: Vec<OracleRequest>,
}

/// Oracle returning canned replies per mode, in order.
///
/// Clones share the same script, so a test can hand one clone to the engine
/// and inspect captured requests through another. When a mode's queue is
/// empty the repeated reply (if any) is used, otherwise the call fails.
#[derive(Clone, Default)]
pub struct ScriptedOracle {
    script: Arc<Mutex<Script>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synthesize(self, reply: &str) -> Self {
        self.push(OracleMode::Synthesize, Ok(reply.to_string()))
    }

    pub fn evaluate(self, reply: &str) -> Self {
        self.push(OracleMode::Evaluate, Ok(reply.to_string()))
    }

    pub fn select(self, reply: &str) -> Self {
        self.push(OracleMode::SelectCapabilities, Ok(reply.to_string()))
    }

    /// Queue an unreachable-oracle failure for `mode`.
    pub fn fail(self, mode: OracleMode, message: &str) -> Self {
        self.push(mode, Err(message.to_string()))
    }

    /// Reply used for `mode` once its queue is drained.
    pub fn repeat(self, mode: OracleMode, reply: &str) -> Self {
        self.lock().repeats.insert(mode, reply.to_string());
        self
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_for(&self, mode: OracleMode) -> Vec<OracleRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.mode == mode)
            .cloned()
            .collect()
    }

    /// Panic if any queued reply was never consumed.
    pub fn assert_drained(&self) {
        let script = self.lock();
        for (mode, queue) in &script.queues {
            assert!(queue.is_empty(), "{} unused {mode} replies", queue.len());
        }
    }

    fn push(self, mode: OracleMode, reply: Result<String, String>) -> Self {
        self.lock().queues.entry(mode).or_default().push_back(reply);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, request: &OracleRequest) -> Result<String> {
        let mut script = self.lock();
        script.requests.push(request.clone());
        let next = script
            .queues
            .get_mut(&request.mode)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => match script.repeats.get(&request.mode) {
                Some(reply) => Ok(reply.clone()),
                None => bail!("no scripted {} reply left", request.mode),
            },
        }
    }

    fn label(&self) -> String {
        "scripted".to_string()
    }
}

/// Temporary repository populated from `(path, contents)` pairs.
pub struct FixtureRepo {
    dir: TempDir,
}

impl FixtureRepo {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("create fixture dir");
        for (path, contents) in files {
            let target = dir.path().join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).expect("create fixture parent");
            }
            fs::write(&target, contents).expect("write fixture file");
        }
        Self { dir }
    }

    /// Small Python service used by most scenarios.
    pub fn python_service() -> Self {
        Self::new(&[
            ("README.md", "# Orders\n\nTracks customer orders.\n"),
            ("pyproject.toml", "[project]\nname = \"orders\"\n"),
            (
                "src/orders/models.py",
                "class Order:\n    def total(self):\n        return 0\n",
            ),
            (
                "src/orders/api.py",
                "from orders.models import Order\n\n\ndef create_order(payload):\n    return Order()\n",
            ),
        ])
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Sink keeping persisted states in memory. Clones share storage.
#[derive(Clone, Default)]
pub struct MemorySink {
    saved: Arc<Mutex<Vec<RunState>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<RunState> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ArtifactSink for MemorySink {
    fn persist(&self, state: &RunState) -> Result<PersistedPaths> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(state.clone());
        let base = PathBuf::from("memory");
        Ok(PersistedPaths {
            artifact: base.join("requirements.md"),
            timestamped_artifact: base.join("stamped_requirements.md"),
            report: base.join("report.md"),
            snapshot: base.join("run.json"),
            intermediate: Vec::new(),
        })
    }
}

/// Sink that always fails, for persistence-error paths.
pub struct FailingSink;

impl ArtifactSink for FailingSink {
    fn persist(&self, _state: &RunState) -> Result<PersistedPaths> {
        bail!("disk full")
    }
}
