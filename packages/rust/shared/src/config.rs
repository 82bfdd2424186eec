//! Pipeline configuration.
//!
//! The configuration tree is read from a TOML or YAML file, patched with
//! dotted `key=value` overrides, then deserialized into [`PipelineConfig`]
//! and validated. It is read-only for the rest of the run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::types::ArtifactRef;

/// Default configuration file, relative to the invocation directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level pipeline config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// `[main]` section.
    pub main: MainConfig,

    /// `[data]` section.
    pub data: DataConfig,

    /// Hyperparameters for the training step, handed to it verbatim.
    pub random_forest_pipeline: ModelConfig,

    /// How steps are launched.
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// `[main]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainConfig {
    /// Tracking project all step runs are logged under.
    pub project_name: String,

    /// Run group associating every step of one pipeline execution.
    pub experiment_name: String,

    /// Steps to execute, as a comma-delimited string or a list.
    pub execute_steps: ExecuteSteps,

    /// Seed forwarded to the training step.
    pub random_seed: i64,

    /// Reject unknown step names instead of skipping them.
    #[serde(default)]
    pub strict_steps: bool,
}

/// `main.execute_steps` in either of its accepted shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecuteSteps {
    /// `"download,preprocess"`, typically passed on the command line.
    Csv(String),
    /// `["download", "preprocess"]`.
    List(Vec<String>),
}

impl ExecuteSteps {
    /// Normalize to a set of trimmed, non-empty step names.
    pub fn names(&self) -> BTreeSet<String> {
        let raw: Vec<&str> = match self {
            Self::Csv(s) => s.split(',').collect(),
            Self::List(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// `[data]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Source the download step fetches.
    pub file_url: String,

    /// Pre-existing artifact the data check compares the sample against.
    pub reference_dataset: String,

    /// Significance threshold for the data check's statistical test.
    pub ks_alpha: f64,

    /// Held-out fraction for the test split (also used as validation size).
    pub test_size: f64,

    /// Column the splits are stratified on.
    pub stratify: String,
}

/// `[random_forest_pipeline]` section. Everything except `export_artifact`
/// is opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Artifact name the trained model is exported under.
    pub export_artifact: String,

    /// Remaining hyperparameter tree.
    #[serde(flatten)]
    pub hyperparameters: serde_json::Map<String, Value>,
}

/// `[runner]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Program used to launch a step.
    #[serde(default = "default_runner_command")]
    pub command: String,

    /// Arguments placed before the step directory.
    #[serde(default = "default_runner_args")]
    pub args: Vec<String>,

    /// Flag introducing the entry point name.
    #[serde(default = "default_entry_point_flag")]
    pub entry_point_flag: String,

    /// Flag introducing each `key=value` parameter.
    #[serde(default = "default_param_flag")]
    pub param_flag: String,

    /// Kill a step that runs longer than this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Base for per-run work directories. Defaults to `<root>/outputs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: default_runner_command(),
            args: default_runner_args(),
            entry_point_flag: default_entry_point_flag(),
            param_flag: default_param_flag(),
            timeout_secs: None,
            work_dir: None,
        }
    }
}

fn default_runner_command() -> String {
    "mlflow".into()
}
fn default_runner_args() -> Vec<String> {
    vec!["run".into()]
}
fn default_entry_point_flag() -> String {
    "-e".into()
}
fn default_param_flag() -> String {
    "-P".into()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl PipelineConfig {
    /// Check required fields beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        if self.main.project_name.trim().is_empty() {
            return Err(PipelineError::config("main.project_name must not be empty"));
        }
        if self.main.experiment_name.trim().is_empty() {
            return Err(PipelineError::config(
                "main.experiment_name must not be empty",
            ));
        }

        url::Url::parse(&self.data.file_url).map_err(|e| {
            PipelineError::config(format!(
                "data.file_url '{}' is not a valid URL: {e}",
                self.data.file_url
            ))
        })?;

        self.data
            .reference_dataset
            .parse::<ArtifactRef>()
            .map_err(|e| PipelineError::config(format!("data.reference_dataset: {e}")))?;

        if !(self.data.ks_alpha > 0.0 && self.data.ks_alpha < 1.0) {
            return Err(PipelineError::config(format!(
                "data.ks_alpha must be in (0, 1), got {}",
                self.data.ks_alpha
            )));
        }
        if !(self.data.test_size > 0.0 && self.data.test_size < 1.0) {
            return Err(PipelineError::config(format!(
                "data.test_size must be in (0, 1), got {}",
                self.data.test_size
            )));
        }

        if self.random_forest_pipeline.export_artifact.trim().is_empty() {
            return Err(PipelineError::config(
                "random_forest_pipeline.export_artifact must not be empty",
            ));
        }

        if self.runner.command.trim().is_empty() {
            return Err(PipelineError::config("runner.command must not be empty"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load, override, and validate the config at `path`.
pub fn load_config_from(path: &Path, overrides: &[String]) -> Result<PipelineConfig> {
    let mut tree = read_tree(path)?;
    for spec in overrides {
        apply_override(&mut tree, spec)?;
    }
    let config = config_from_tree(tree)?;
    tracing::debug!(?path, overrides = overrides.len(), "config loaded");
    Ok(config)
}

/// Deserialize and validate an already-parsed configuration tree.
pub fn config_from_tree(tree: Value) -> Result<PipelineConfig> {
    let config: PipelineConfig = serde_json::from_value(tree)
        .map_err(|e| PipelineError::config(format!("invalid configuration: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Read a config file into a generic tree, choosing the parser by extension.
fn read_tree(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| {
            PipelineError::config(format!("failed to parse {}: {e}", path.display()))
        }),
        "toml" | "" => toml::from_str(&content).map_err(|e| {
            PipelineError::config(format!("failed to parse {}: {e}", path.display()))
        }),
        other => Err(PipelineError::config(format!(
            "unsupported config format '.{other}' for {}",
            path.display()
        ))),
    }
}

/// Apply one `dotted.key=value` override to the raw tree.
///
/// The value is read as JSON when it parses as such (numbers, bools, quoted
/// strings, lists), and as a bare string otherwise. A key that already holds
/// a string keeps a string value.
pub fn apply_override(tree: &mut Value, spec: &str) -> Result<()> {
    let (key, raw) = spec
        .split_once('=')
        .ok_or_else(|| PipelineError::config(format!("override '{spec}' is not key=value")))?;

    let segments: Vec<&str> = key.trim().split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PipelineError::config(format!(
            "override key '{key}' is not a dotted path"
        )));
    }

    let raw = raw.trim();

    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| PipelineError::config(format!("override '{spec}' has no key")))?;

    let mut node = tree;
    for segment in parents {
        let map = node.as_object_mut().ok_or_else(|| {
            PipelineError::config(format!("override '{key}': '{segment}' is not a table"))
        })?;
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }

    let map = node
        .as_object_mut()
        .ok_or_else(|| PipelineError::config(format!("override '{key}': parent is not a table")))?;
    let value = match map.get(*last) {
        Some(Value::String(_)) => {
            Value::String(serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string()))
        }
        _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    };
    map.insert(last.to_string(), value);

    tracing::debug!(key, "applied config override");
    Ok(())
}
