//! Step runners: launch one step as an isolated unit of work and report
//! its outcome.
//!
//! [`ProcessRunner`] spawns the configured command (by default
//! `mlflow run <step_dir> -e main -P key=value ...`). Step output goes
//! straight to the operator's terminal; the runner only adds the exit status.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use mlpipe_shared::{PipelineError, Result, RunnerConfig};

use crate::context::RunContext;
use crate::params::StepInvocation;

/// Executes a single step invocation to completion.
///
/// Implementations must not retry, mutate parameters, or reinterpret a
/// step's failure.
pub trait StepRunner {
    fn run(
        &self,
        invocation: &StepInvocation,
        ctx: &RunContext,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Arguments following the program name for one invocation.
fn command_args(
    config: &RunnerConfig,
    invocation: &StepInvocation,
    step_dir: &Path,
) -> Vec<String> {
    let mut args = config.args.clone();
    args.push(step_dir.to_string_lossy().into_owned());
    args.push(config.entry_point_flag.clone());
    args.push(invocation.spec.entry_point.to_string());
    for param in invocation.rendered_params() {
        args.push(config.param_flag.clone());
        args.push(param);
    }
    args
}

// ---------------------------------------------------------------------------
// Process runner
// ---------------------------------------------------------------------------

/// Runs each step as a child process rooted at the step's directory.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: RunnerConfig,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }
}

impl StepRunner for ProcessRunner {
    #[instrument(skip_all, fields(step = invocation.spec.name))]
    async fn run(&self, invocation: &StepInvocation, ctx: &RunContext) -> Result<()> {
        let name = invocation.spec.name;
        let step_dir = ctx.step_dir(&invocation.spec);

        if !step_dir.is_dir() {
            return Err(PipelineError::step_failed(
                name,
                format!("step directory {} does not exist", step_dir.display()),
            ));
        }

        let args = command_args(&self.config, invocation, &step_dir);
        info!(command = %self.config.command, ?args, "launching step");

        let mut child = Command::new(&self.config.command)
            .args(&args)
            .current_dir(&step_dir)
            .envs(ctx.tracking_env())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PipelineError::step_failed(
                    name,
                    format!("failed to spawn `{}`: {e}", self.config.command),
                )
            })?;

        let waited = match self.config.timeout_secs {
            Some(secs) => {
                let outcome = tokio::time::timeout(Duration::from_secs(secs), child.wait()).await;
                match outcome {
                    Ok(waited) => waited,
                    Err(_) => {
                        warn!(timeout_secs = secs, "step timed out, killing it");
                        if let Err(e) = child.kill().await {
                            warn!(error = %e, "failed to kill timed-out step");
                        }
                        return Err(PipelineError::step_failed(
                            name,
                            format!("timed out after {secs}s"),
                        ));
                    }
                }
            }
            None => child.wait().await,
        };

        let status = waited
            .map_err(|e| PipelineError::step_failed(name, format!("failed to wait: {e}")))?;

        if !status.success() {
            return Err(PipelineError::step_failed(name, status.to_string()));
        }

        debug!("step exited successfully");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dry-run runner
// ---------------------------------------------------------------------------

/// Logs the command each step would run without launching anything.
#[derive(Debug, Clone)]
pub struct DryRunRunner {
    config: RunnerConfig,
}

impl DryRunRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// The full command line for an invocation, program first.
    pub fn command_line(&self, invocation: &StepInvocation, ctx: &RunContext) -> Vec<String> {
        let step_dir = ctx.step_dir(&invocation.spec);
        let mut line = vec![self.config.command.clone()];
        line.extend(command_args(&self.config, invocation, &step_dir));
        line
    }
}

impl StepRunner for DryRunRunner {
    async fn run(&self, invocation: &StepInvocation, ctx: &RunContext) -> Result<()> {
        let line = self.command_line(invocation, ctx);
        info!(
            step = invocation.spec.name,
            command = %line.join(" "),
            "dry run: step not launched"
        );
        Ok(())
    }
}
