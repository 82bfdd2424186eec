//! Shared types, error model, and configuration for mlpipe.
//!
//! This crate is the foundation depended on by the other mlpipe crates.
//! It provides:
//! - [`PipelineError`]: the unified error type
//! - Domain types ([`ArtifactRef`], [`ParamValue`], [`RunId`])
//! - Configuration ([`PipelineConfig`], config loading and overrides)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    DEFAULT_CONFIG_FILE, DataConfig, ExecuteSteps, MainConfig, ModelConfig, PipelineConfig,
    RunnerConfig, apply_override, config_from_tree, load_config_from,
};
pub use error::{PipelineError, Result};
pub use types::{ArtifactRef, ArtifactVersion, LATEST_TAG, ParamValue, RunId, resolve_artifact};
