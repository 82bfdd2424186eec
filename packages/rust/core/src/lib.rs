//! Orchestration kernel for mlpipe.
//!
//! This crate holds the fixed step catalog, the per-step parameter
//! builders, the step runners, and the controller that ties them together
//! into one sequential, fail-fast pipeline run (`run_pipeline`).

pub mod catalog;
pub mod context;
pub mod params;
pub mod pipeline;
pub mod runner;

#[cfg(test)]
mod test_support;

pub use catalog::{CATALOG, CatalogEntry, StepSpec};
pub use context::RunContext;
pub use params::{PreparedStep, StepInvocation};
pub use pipeline::{PipelineProgress, RunSummary, SilentProgress, run_pipeline};
pub use runner::{DryRunRunner, ProcessRunner, StepRunner};
