//! Closed registry of read-only inspection capabilities.
//!
//! Each [`Capability`] declares its parameters; the registry compiles them into
//! a JSON Schema and validates every incoming argument map before the handler
//! runs. The repository root is never an oracle-visible parameter: callers pass
//! it separately and any `repo_path` key in the arguments is discarded.

pub mod files;
pub mod outline;
pub mod search;
pub mod walk;

use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use anyhow::{Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

/// Argument key owned by the engine.
pub const REPO_PATH_ARG: &str = "repo_path";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("unknown capability `{0}`")]
    NotFound(String),
    #[error("invalid arguments for `{name}`: {message}")]
    InvalidArguments { name: String, message: String },
    #[error("{0}")]
    Execution(String),
}

impl CapabilityError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

pub type CapabilityResult = std::result::Result<String, CapabilityError>;

/// Handler signature: repository root plus validated arguments.
pub type Handler = fn(&Path, &Map<String, Value>) -> CapabilityResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    fn schema_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
    /// Default shown in the catalog for optional parameters.
    pub default: Option<&'static str>,
}

impl Param {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
            default: None,
        }
    }

    pub const fn optional(
        name: &'static str,
        kind: ParamKind,
        description: &'static str,
        default: Option<&'static str>,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
            default,
        }
    }
}

/// Static description of one capability.
#[derive(Debug, Clone)]
pub struct CapabilitySpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<Param>,
    pub handler: Handler,
}

impl CapabilitySpec {
    /// JSON Schema for the argument map.
    pub fn schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut property = json!({
                "type": param.kind.schema_type(),
                "description": param.description,
            });
            if param.kind == ParamKind::Integer {
                property["minimum"] = json!(1);
            }
            if param.kind == ParamKind::String && param.required {
                property["minLength"] = json!(1);
            }
            properties.insert(param.name.to_string(), property);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// A registered capability with its compiled argument validator.
pub struct Capability {
    spec: CapabilitySpec,
    validator: Validator,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn spec(&self) -> &CapabilitySpec {
        &self.spec
    }

    fn validate(&self, args: &Map<String, Value>) -> std::result::Result<(), CapabilityError> {
        let instance = Value::Object(args.clone());
        let messages: Vec<String> = self
            .validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            return Ok(());
        }
        Err(CapabilityError::InvalidArguments {
            name: self.spec.name.to_string(),
            message: messages.join("; "),
        })
    }
}

/// Fixed, ordered mapping from capability name to handler.
pub struct Registry {
    capabilities: Vec<Capability>,
}

impl Registry {
    pub fn new(specs: Vec<CapabilitySpec>) -> Result<Self> {
        let mut capabilities: Vec<Capability> = Vec::with_capacity(specs.len());
        for spec in specs {
            if capabilities.iter().any(|c| c.name() == spec.name) {
                return Err(anyhow!("duplicate capability `{}`", spec.name));
            }
            if spec.params.iter().any(|p| p.name == REPO_PATH_ARG) {
                return Err(anyhow!(
                    "capability `{}` declares reserved parameter `{REPO_PATH_ARG}`",
                    spec.name
                ));
            }
            let validator = validator_for(&spec.schema())
                .map_err(|err| anyhow!("invalid schema for `{}`: {}", spec.name, err))?;
            capabilities.push(Capability { spec, validator });
        }
        Ok(Self { capabilities })
    }

    /// The eight built-in inspection capabilities.
    pub fn builtin() -> Result<Self> {
        let mut specs = files::specs();
        specs.extend(outline::specs());
        specs.extend(search::specs());
        Self::new(specs)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.capabilities.iter().map(Capability::name)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Validate and run a capability against `root`.
    pub fn invoke(&self, root: &Path, name: &str, args: &Map<String, Value>) -> CapabilityResult {
        let capability = self
            .get(name)
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?;
        let args = without_repo_path(args);
        capability.validate(&args)?;
        debug!(capability = name, "invoking capability");
        (capability.spec.handler)(root, &args)
    }

    /// Plain-text catalog shown to the oracle.
    pub fn render_catalog(&self) -> String {
        let mut out = String::new();
        for capability in &self.capabilities {
            let spec = &capability.spec;
            let _ = writeln!(out, "- `{}`: {}", spec.name, spec.description);
            for param in &spec.params {
                let requirement = match (param.required, param.default) {
                    (true, _) => "required".to_string(),
                    (false, Some(default)) => format!("optional, default {default}"),
                    (false, None) => "optional".to_string(),
                };
                let _ = writeln!(
                    out,
                    "  - `{}` ({}, {requirement}): {}",
                    param.name,
                    param.kind.schema_type(),
                    param.description
                );
            }
        }
        out.trim_end().to_string()
    }
}

/// Copy of `args` with the engine-owned `repo_path` key removed.
pub fn without_repo_path(args: &Map<String, Value>) -> Map<String, Value> {
    let mut args = args.clone();
    args.remove(REPO_PATH_ARG);
    args
}

/// Deserialize validated arguments into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(
    name: &str,
    args: &Map<String, Value>,
) -> std::result::Result<T, CapabilityError> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|err| {
        CapabilityError::InvalidArguments {
            name: name.to_string(),
            message: err.to_string(),
        }
    })
}

/// Resolve a repository-relative path, rejecting anything that escapes `root`.
pub(crate) fn resolve_in_root(
    root: &Path,
    relative: &str,
) -> std::result::Result<PathBuf, CapabilityError> {
    let candidate = Path::new(relative.trim());
    if candidate.is_absolute() {
        return Err(CapabilityError::execution(format!(
            "path must be relative to the repository root: {relative}"
        )));
    }
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(CapabilityError::execution(format!(
            "path escapes the repository root: {relative}"
        )));
    }
    let joined = root.join(candidate);
    if let (Ok(real_root), Ok(real_path)) = (root.canonicalize(), joined.canonicalize())
        && !real_path.starts_with(&real_root)
    {
        return Err(CapabilityError::execution(format!(
            "path escapes the repository root: {relative}"
        )));
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(_root: &Path, args: &Map<String, Value>) -> CapabilityResult {
        Ok(serde_json::to_string(args).unwrap_or_default())
    }

    fn echo_spec() -> CapabilitySpec {
        CapabilitySpec {
            name: "echo",
            description: "echo arguments",
            params: vec![
                Param::required("text", ParamKind::String, "text to echo"),
                Param::optional("times", ParamKind::Integer, "repeat count", Some("1")),
            ],
            handler: echo,
        }
    }

    #[test]
    fn builtin_registry_has_eight_capabilities() {
        let registry = Registry::builtin().expect("registry");
        let names: Vec<_> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "get_file_content",
                "get_directory_tree",
                "list_files_by_extension",
                "get_file_outline",
                "get_function_info",
                "get_class_info",
                "search_code",
                "search_imports",
            ]
        );
    }

    #[test]
    fn invoke_rejects_unknown_names() {
        let registry = Registry::new(vec![echo_spec()]).expect("registry");
        let err = registry
            .invoke(Path::new("."), "nope", &Map::new())
            .expect_err("unknown");
        assert_eq!(err, CapabilityError::NotFound("nope".to_string()));
    }

    #[test]
    fn invoke_validates_against_schema() {
        let registry = Registry::new(vec![echo_spec()]).expect("registry");
        let mut args = Map::new();
        args.insert("times".to_string(), json!("three"));
        let err = registry
            .invoke(Path::new("."), "echo", &args)
            .expect_err("invalid");
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));

        let mut extra = Map::new();
        extra.insert("text".to_string(), json!("hi"));
        extra.insert("colour".to_string(), json!("red"));
        assert!(registry.invoke(Path::new("."), "echo", &extra).is_err());
    }

    #[test]
    fn invoke_strips_repo_path() {
        let registry = Registry::new(vec![echo_spec()]).expect("registry");
        let mut args = Map::new();
        args.insert("text".to_string(), json!("hi"));
        args.insert(REPO_PATH_ARG.to_string(), json!("/etc"));
        let out = registry
            .invoke(Path::new("."), "echo", &args)
            .expect("valid");
        assert_eq!(out, r#"{"text":"hi"}"#);
    }

    #[test]
    fn registry_rejects_reserved_and_duplicate_params() {
        let mut reserved = echo_spec();
        reserved
            .params
            .push(Param::required(REPO_PATH_ARG, ParamKind::String, "root"));
        assert!(Registry::new(vec![reserved]).is_err());
        assert!(Registry::new(vec![echo_spec(), echo_spec()]).is_err());
    }

    #[test]
    fn catalog_lists_parameters_and_defaults() {
        let registry = Registry::new(vec![echo_spec()]).expect("registry");
        let catalog = registry.render_catalog();
        assert!(catalog.contains("- `echo`: echo arguments"));
        assert!(catalog.contains("`text` (string, required)"));
        assert!(catalog.contains("`times` (integer, optional, default 1)"));
    }

    #[test]
    fn resolve_in_root_rejects_escapes() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(resolve_in_root(temp.path(), "../secret").is_err());
        assert!(resolve_in_root(temp.path(), "/etc/passwd").is_err());
        assert!(resolve_in_root(temp.path(), "src/lib.rs").is_ok());
    }
}
