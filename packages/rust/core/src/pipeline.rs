//! Pipeline controller: select steps from configuration and dispatch them
//! one at a time, in catalog order.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use mlpipe_shared::{ExecuteSteps, PipelineConfig, PipelineError, Result, RunId};

use crate::catalog::{CATALOG, CatalogEntry};
use crate::context::RunContext;
use crate::runner::StepRunner;

/// Result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Steps dispatched, in the order they ran.
    pub executed: Vec<String>,
    /// Requested names that matched no catalog step.
    pub skipped: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait PipelineProgress: Send + Sync {
    /// Called before a step is dispatched (`current` is 1-based).
    fn step_started(&self, name: &str, current: usize, total: usize);
    /// Called after a step returned successfully.
    fn step_finished(&self, name: &str, elapsed: Duration);
    /// Called when every selected step has completed.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl PipelineProgress for SilentProgress {
    fn step_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn step_finished(&self, _name: &str, _elapsed: Duration) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Step selection
// ---------------------------------------------------------------------------

/// Catalog steps chosen for a run, plus the requested names that matched none.
#[derive(Debug)]
pub struct StepSelection {
    pub steps: Vec<&'static CatalogEntry>,
    pub unknown: Vec<String>,
}

/// Resolve `execute_steps` against the catalog.
///
/// The result is in catalog order regardless of the configured order.
/// Unknown names are skipped with a warning, or rejected when `strict`.
pub fn select_steps(execute_steps: &ExecuteSteps, strict: bool) -> Result<StepSelection> {
    let requested = execute_steps.names();

    let unknown: Vec<String> = requested
        .iter()
        .filter(|name| !CATALOG.iter().any(|e| e.spec.name == name.as_str()))
        .cloned()
        .collect();

    if !unknown.is_empty() {
        if strict {
            return Err(PipelineError::UnknownStep {
                name: unknown.join(", "),
            });
        }
        for name in &unknown {
            warn!(step = %name, "unknown step requested, skipping");
        }
    }

    let steps: Vec<&'static CatalogEntry> = CATALOG
        .iter()
        .filter(|e| requested.contains(e.spec.name))
        .collect();

    let selected: BTreeSet<&str> = steps.iter().map(|e| e.spec.name).collect();
    for entry in &steps {
        for dep in entry.depends_on {
            if !selected.contains(dep) {
                debug!(
                    step = entry.spec.name,
                    dependency = dep,
                    "dependency not selected, its artifacts must already exist"
                );
            }
        }
    }

    Ok(StepSelection { steps, unknown })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run every selected step once, in catalog order, stopping at the first
/// failure.
///
/// A step's scoped resources are released only after its runner returns.
/// The first error is returned unchanged; nothing is retried or rolled back.
#[instrument(skip_all, fields(run_id = %ctx.run_id, group = %ctx.run_group))]
pub async fn run_pipeline<R: StepRunner>(
    config: &PipelineConfig,
    ctx: &RunContext,
    runner: &R,
    progress: &dyn PipelineProgress,
) -> Result<RunSummary> {
    let start = Instant::now();
    let selection = select_steps(&config.main.execute_steps, config.main.strict_steps)?;
    let total = selection.steps.len();

    info!(
        steps = ?selection.steps.iter().map(|e| e.spec.name).collect::<Vec<_>>(),
        "starting pipeline"
    );

    let mut executed = Vec::with_capacity(total);

    for (i, entry) in selection.steps.iter().enumerate() {
        let name = entry.spec.name;
        progress.step_started(name, i + 1, total);

        let prepared = (entry.build)(&entry.spec, config, ctx)?;
        let step_start = Instant::now();
        let outcome = runner.run(prepared.invocation(), ctx).await;
        drop(prepared);

        if let Err(e) = outcome {
            error!(step = name, error = %e, "step failed, aborting pipeline");
            return Err(e);
        }

        let elapsed = step_start.elapsed();
        info!(step = name, elapsed_ms = elapsed.as_millis(), "step complete");
        progress.step_finished(name, elapsed);
        executed.push(name.to_string());
    }

    let summary = RunSummary {
        run_id: ctx.run_id,
        executed,
        skipped: selection.unknown,
        started_at: ctx.started_at,
        elapsed: start.elapsed(),
    };

    progress.done(&summary);

    info!(
        executed = summary.executed.len(),
        skipped = summary.skipped.len(),
        elapsed_ms = summary.elapsed.as_millis(),
        "pipeline complete"
    );

    Ok(summary)
}
