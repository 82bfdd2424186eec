//! Run context: the identifiers and paths every step of one run shares.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use mlpipe_shared::{PipelineConfig, PipelineError, Result, RunId};

use crate::catalog::StepSpec;

/// Environment variable naming the tracking project, set on each step process.
pub const PROJECT_ENV: &str = "WANDB_PROJECT";

/// Environment variable naming the run group, set on each step process.
pub const RUN_GROUP_ENV: &str = "WANDB_RUN_GROUP";

/// Base directory for per-run working directories when `runner.work_dir` is unset.
pub const RUN_OUTPUT_DIR: &str = "outputs";

/// Process-wide state for one pipeline run. Built once before any step runs
/// and passed by reference into every runner call.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Identifier of this run, for logs and the run summary.
    pub run_id: RunId,
    /// Tracking project the steps report under.
    pub project_name: String,
    /// Group label associating every step of this run.
    pub run_group: String,
    /// Absolute project root; step paths are resolved against it.
    pub root_path: PathBuf,
    /// Absolute directory for files handed to steps, unique to this run.
    pub work_dir: PathBuf,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Establish the run context from configuration.
    ///
    /// The root is `project_root` when given, otherwise the directory the
    /// process was invoked from. It is made absolute here, so later changes
    /// of working directory cannot move it.
    ///
    /// The work directory is `<base>/<run_id>`, where the base is
    /// `runner.work_dir` or `<root>/outputs`. Runs sharing a project root
    /// never share files handed to their steps.
    pub fn initialize(config: &PipelineConfig, project_root: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| PipelineError::io(".", e))?;

        let root_path = match project_root {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => cwd.join(p),
            None => cwd,
        };

        if !root_path.is_dir() {
            return Err(PipelineError::config(format!(
                "project root {} is not a directory",
                root_path.display()
            )));
        }

        let base = match &config.runner.work_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root_path.join(dir),
            None => root_path.join(RUN_OUTPUT_DIR),
        };
        let run_id = RunId::new();
        let work_dir = base.join(run_id.to_string());

        let ctx = Self {
            run_id,
            project_name: config.main.project_name.clone(),
            run_group: config.main.experiment_name.clone(),
            root_path,
            work_dir,
            started_at: Utc::now(),
        };

        info!(
            run_id = %ctx.run_id,
            project = %ctx.project_name,
            group = %ctx.run_group,
            root = %ctx.root_path.display(),
            work_dir = %ctx.work_dir.display(),
            "run context initialized"
        );

        Ok(ctx)
    }

    /// Tracking identifiers as environment pairs for a step process.
    pub fn tracking_env(&self) -> [(&'static str, &str); 2] {
        [
            (PROJECT_ENV, self.project_name.as_str()),
            (RUN_GROUP_ENV, self.run_group.as_str()),
        ]
    }

    /// Absolute directory of a step's executable unit.
    pub fn step_dir(&self, spec: &StepSpec) -> PathBuf {
        self.root_path.join(spec.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::test_support::sample_config;

    #[test]
    fn identifiers_come_from_config() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = sample_config();
        let ctx = RunContext::initialize(&config, Some(dir.path())).expect("init");

        assert_eq!(ctx.project_name, "genre_classification");
        assert_eq!(ctx.run_group, "dev");
        assert_eq!(
            ctx.tracking_env(),
            [
                ("WANDB_PROJECT", "genre_classification"),
                ("WANDB_RUN_GROUP", "dev")
            ]
        );
    }

    #[test]
    fn paths_resolve_against_root() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let mut config = sample_config();
        config.runner.work_dir = Some("scratch".into());

        let ctx = RunContext::initialize(&config, Some(dir.path())).expect("init");
        assert_eq!(ctx.root_path, dir.path());
        assert_eq!(
            ctx.work_dir,
            dir.path().join("scratch").join(ctx.run_id.to_string())
        );

        let segregate = catalog::find("segregate").expect("catalog entry");
        assert_eq!(ctx.step_dir(&segregate.spec), dir.path().join("segregate"));
    }

    #[test]
    fn default_work_dir_is_unique_per_run() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = sample_config();
        let a = RunContext::initialize(&config, Some(dir.path())).expect("init");
        let b = RunContext::initialize(&config, Some(dir.path())).expect("init");

        assert_ne!(a.work_dir, b.work_dir);
        assert_eq!(
            a.work_dir,
            dir.path().join(RUN_OUTPUT_DIR).join(a.run_id.to_string())
        );
        assert_ne!(a.work_dir, a.root_path);
    }

    #[test]
    fn missing_root_is_rejected() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = sample_config();
        let missing = dir.path().join("nope");
        let err = RunContext::initialize(&config, Some(missing.as_path())).unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
