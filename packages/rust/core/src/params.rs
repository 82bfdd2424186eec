//! Step parameter builders.
//!
//! Each catalog step has one builder producing the exact parameter set the
//! step expects. Inputs come from configuration and from artifact
//! references to what earlier steps produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use mlpipe_shared::{ArtifactRef, ParamValue, PipelineConfig, PipelineError, Result};

use crate::catalog::StepSpec;
use crate::context::RunContext;

/// Output of the download step.
pub const RAW_DATA_ARTIFACT: &str = "raw_data.parquet";
/// Output of the preprocess step.
pub const PREPROCESSED_ARTIFACT: &str = "preprocessed_data.csv";
/// Name prefix of the segregate step's split artifacts.
pub const SEGREGATED_ROOT: &str = "data";
/// File the training step reads its hyperparameters from.
pub const MODEL_CONFIG_FILE: &str = "random_forest_config.yml";

/// Name of one split produced by the segregate step, e.g. `data_train.csv`.
pub fn split_artifact(split: &str) -> String {
    format!("{SEGREGATED_ROOT}_{split}.csv")
}

// ---------------------------------------------------------------------------
// Invocation types
// ---------------------------------------------------------------------------

/// Resolved parameters for one step execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInvocation {
    pub spec: StepSpec,
    pub params: BTreeMap<String, ParamValue>,
}

impl StepInvocation {
    fn new(spec: &StepSpec) -> Self {
        Self {
            spec: *spec,
            params: BTreeMap::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Look up a parameter by name.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// Parameters rendered as `key=value` pairs, sorted by key.
    pub fn rendered_params(&self) -> impl Iterator<Item = String> + '_ {
        self.params.iter().map(|(k, v)| format!("{k}={v}"))
    }
}

/// An invocation plus the scoped resources that must outlive the step.
///
/// Dropping it releases the resources, so it must be held until the
/// runner returns.
#[derive(Debug)]
pub struct PreparedStep {
    invocation: StepInvocation,
    resources: Vec<ScopedFile>,
}

impl PreparedStep {
    fn new(invocation: StepInvocation) -> Self {
        Self {
            invocation,
            resources: Vec::new(),
        }
    }

    fn holding(mut self, file: ScopedFile) -> Self {
        self.resources.push(file);
        self
    }

    pub fn invocation(&self) -> &StepInvocation {
        &self.invocation
    }

    /// Paths of the files kept alive for this step.
    pub fn resource_paths(&self) -> impl Iterator<Item = &Path> {
        self.resources.iter().map(ScopedFile::path)
    }
}

/// A file that exists for as long as this handle does.
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    /// Write `contents` to `path`, creating parent directories.
    pub fn create(path: PathBuf, contents: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::resource(parent, format!("cannot create directory: {e}"))
            })?;
        }
        std::fs::write(&path, contents)
            .map_err(|e| PipelineError::resource(&path, format!("cannot write file: {e}")))?;
        debug!(path = %path.display(), bytes = contents.len(), "scoped file written");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "scoped file removed"),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove scoped file")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn download(
    spec: &StepSpec,
    config: &PipelineConfig,
    _ctx: &RunContext,
) -> Result<PreparedStep> {
    let inv = StepInvocation::new(spec)
        .with("file_url", &config.data.file_url)
        .with("artifact_name", RAW_DATA_ARTIFACT)
        .with("artifact_type", "raw_data")
        .with("artifact_description", "Data as downloaded");
    Ok(PreparedStep::new(inv))
}

pub fn preprocess(
    spec: &StepSpec,
    _config: &PipelineConfig,
    _ctx: &RunContext,
) -> Result<PreparedStep> {
    let inv = StepInvocation::new(spec)
        .with("input_artifact", ArtifactRef::latest(RAW_DATA_ARTIFACT)?)
        .with("artifact_name", PREPROCESSED_ARTIFACT)
        .with("artifact_type", "preprocessed_data")
        .with("artifact_description", "Data with preprocessing applied");
    Ok(PreparedStep::new(inv))
}

/// The reference dataset is passed through as configured; it is expected to
/// already exist in the artifact store.
pub fn check_data(
    spec: &StepSpec,
    config: &PipelineConfig,
    _ctx: &RunContext,
) -> Result<PreparedStep> {
    let inv = StepInvocation::new(spec)
        .with("reference_artifact", &config.data.reference_dataset)
        .with("sample_artifact", ArtifactRef::latest(PREPROCESSED_ARTIFACT)?)
        .with("ks_alpha", config.data.ks_alpha);
    Ok(PreparedStep::new(inv))
}

pub fn segregate(
    spec: &StepSpec,
    config: &PipelineConfig,
    _ctx: &RunContext,
) -> Result<PreparedStep> {
    let inv = StepInvocation::new(spec)
        .with("input_artifact", ArtifactRef::latest(PREPROCESSED_ARTIFACT)?)
        .with("artifact_root", SEGREGATED_ROOT)
        .with("artifact_type", "segregated_data")
        .with("test_size", config.data.test_size)
        .with("stratify", &config.data.stratify);
    Ok(PreparedStep::new(inv))
}

/// Serializes `random_forest_pipeline` to YAML in the work directory and passes its
/// absolute path. The file is removed when the returned step is dropped.
pub fn random_forest(
    spec: &StepSpec,
    config: &PipelineConfig,
    ctx: &RunContext,
) -> Result<PreparedStep> {
    let path = ctx.work_dir.join(MODEL_CONFIG_FILE);
    let yaml = serde_yaml::to_string(&config.random_forest_pipeline).map_err(|e| {
        PipelineError::resource(&path, format!("cannot serialize model config: {e}"))
    })?;
    let model_config = ScopedFile::create(path, &yaml)?;

    let inv = StepInvocation::new(spec)
        .with("train_data", ArtifactRef::latest(split_artifact("train"))?)
        .with("model_config", model_config.path().to_string_lossy().into_owned())
        .with("export_artifact", &config.random_forest_pipeline.export_artifact)
        .with("random_seed", config.main.random_seed)
        .with("val_size", config.data.test_size)
        .with("stratify", &config.data.stratify);
    Ok(PreparedStep::new(inv).holding(model_config))
}

pub fn evaluate(
    spec: &StepSpec,
    config: &PipelineConfig,
    _ctx: &RunContext,
) -> Result<PreparedStep> {
    let inv = StepInvocation::new(spec)
        .with(
            "model_export",
            ArtifactRef::latest(config.random_forest_pipeline.export_artifact.as_str())?,
        )
        .with("test_data", ArtifactRef::latest(split_artifact("test"))?);
    Ok(PreparedStep::new(inv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::test_support::{sample_config, sample_context};

    fn build(name: &str, config: &PipelineConfig, ctx: &RunContext) -> PreparedStep {
        let entry = catalog::find(name).expect("catalog entry");
        (entry.build)(&entry.spec, config, ctx).expect("build params")
    }

    fn rendered(step: &PreparedStep) -> Vec<String> {
        step.invocation().rendered_params().collect()
    }

    #[test]
    fn download_params() {
        let (_dir, ctx) = sample_context();
        let step = build("download", &sample_config(), &ctx);
        assert_eq!(
            rendered(&step),
            [
                "artifact_description=Data as downloaded",
                "artifact_name=raw_data.parquet",
                "artifact_type=raw_data",
                "file_url=https://example.com/genres_mod.parquet",
            ]
        );
    }

    #[test]
    fn preprocess_params() {
        let (_dir, ctx) = sample_context();
        let step = build("preprocess", &sample_config(), &ctx);
        assert_eq!(
            rendered(&step),
            [
                "artifact_description=Data with preprocessing applied",
                "artifact_name=preprocessed_data.csv",
                "artifact_type=preprocessed_data",
                "input_artifact=raw_data.parquet:latest",
            ]
        );
    }

    #[test]
    fn check_data_params() {
        let (_dir, ctx) = sample_context();
        let step = build("check_data", &sample_config(), &ctx);
        assert_eq!(
            rendered(&step),
            [
                "ks_alpha=0.05",
                "reference_artifact=genre_classification/preprocessed_data.csv:latest",
                "sample_artifact=preprocessed_data.csv:latest",
            ]
        );
    }

    #[test]
    fn segregate_params() {
        let (_dir, ctx) = sample_context();
        let step = build("segregate", &sample_config(), &ctx);
        assert_eq!(
            rendered(&step),
            [
                "artifact_root=data",
                "artifact_type=segregated_data",
                "input_artifact=preprocessed_data.csv:latest",
                "stratify=genre",
                "test_size=0.3",
            ]
        );
    }

    #[test]
    fn random_forest_params_and_model_file() {
        let (_dir, ctx) = sample_context();
        let config = sample_config();
        let step = build("random_forest", &config, &ctx);
        let inv = step.invocation();

        assert_eq!(inv.get("train_data"), Some(&ParamValue::from("data_train.csv:latest")));
        assert_eq!(inv.get("export_artifact"), Some(&ParamValue::from("model_export")));
        assert_eq!(inv.get("random_seed"), Some(&ParamValue::Int(42)));
        assert_eq!(inv.get("val_size"), Some(&ParamValue::Float(0.3)));
        assert_eq!(inv.get("stratify"), Some(&ParamValue::from("genre")));

        let expected_path = ctx.work_dir.join(MODEL_CONFIG_FILE);
        assert!(expected_path.is_absolute());
        assert_eq!(
            inv.get("model_config"),
            Some(&ParamValue::from(expected_path.to_string_lossy().into_owned()))
        );

        let content = std::fs::read_to_string(&expected_path).expect("model config exists");
        let parsed: serde_json::Value = serde_yaml::from_str(&content).expect("valid yaml");
        let expected = serde_json::to_value(&config.random_forest_pipeline).expect("to value");
        assert_eq!(parsed, expected);
        assert_eq!(parsed["features"]["numerical"][1], "energy");

        drop(step);
        assert!(!expected_path.exists(), "model config removed with the step");
    }

    #[test]
    fn model_file_keeps_configured_key_order() {
        let (_dir, ctx) = sample_context();
        let step = build("random_forest", &sample_config(), &ctx);
        let path = step.resource_paths().next().expect("model config");
        let content = std::fs::read_to_string(path).expect("model config exists");

        let pos = |key: &str| content.find(&format!("\n{key}:")).expect(key);
        assert!(pos("random_forest") < pos("tfidf"));
        assert!(pos("tfidf") < pos("features"));
    }

    #[test]
    fn runs_sharing_a_root_keep_separate_model_files() {
        let (dir, first) = sample_context();
        let second = RunContext::initialize(&sample_config(), Some(dir.path())).expect("context");
        let config = sample_config();

        let first_step = build("random_forest", &config, &first);
        let second_step = build("random_forest", &config, &second);
        let second_path = second_step
            .resource_paths()
            .next()
            .expect("model config")
            .to_path_buf();

        drop(first_step);
        assert!(second_path.exists(), "other run's model config survives");
        drop(second_step);
        assert!(!second_path.exists());
    }

    #[test]
    fn model_file_leaves_project_root_untouched() {
        let (dir, ctx) = sample_context();
        let user_file = dir.path().join(MODEL_CONFIG_FILE);
        std::fs::write(&user_file, "mine: true\n").expect("write user file");

        let step = build("random_forest", &sample_config(), &ctx);
        drop(step);

        let content = std::fs::read_to_string(&user_file).expect("user file still present");
        assert_eq!(content, "mine: true\n");
    }

    #[test]
    fn random_forest_unwritable_work_dir_is_a_resource_error() {
        let (dir, mut ctx) = sample_context();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").expect("write blocker");
        ctx.work_dir = blocker.join("outputs");

        let entry = catalog::find("random_forest").expect("catalog entry");
        let err = (entry.build)(&entry.spec, &sample_config(), &ctx).unwrap_err();
        assert!(matches!(err, PipelineError::Resource { .. }));
    }

    #[test]
    fn evaluate_params() {
        let (_dir, ctx) = sample_context();
        let step = build("evaluate", &sample_config(), &ctx);
        assert_eq!(
            rendered(&step),
            [
                "model_export=model_export:latest",
                "test_data=data_test.csv:latest",
            ]
        );
    }

    #[test]
    fn only_training_holds_resources() {
        let (_dir, ctx) = sample_context();
        let config = sample_config();
        for entry in &catalog::CATALOG {
            let step = (entry.build)(&entry.spec, &config, &ctx).expect("build");
            let held = step.resource_paths().count();
            let expected = usize::from(entry.spec.name == "random_forest");
            assert_eq!(held, expected, "{}", entry.spec.name);
        }
    }
}
