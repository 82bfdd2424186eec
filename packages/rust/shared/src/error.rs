//! Error types for mlpipe.
//!
//! Library crates use [`PipelineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A requested step name is not part of the step catalog.
    #[error("unknown step '{name}'")]
    UnknownStep { name: String },

    /// A step terminated unsuccessfully, could not be launched, or timed out.
    #[error("step '{step}' failed: {detail}")]
    StepFailed { step: String, detail: String },

    /// A scoped resource handed to a step could not be prepared.
    #[error("resource error at {path:?}: {message}")]
    Resource { path: PathBuf, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a step failure carrying the step's own error detail.
    pub fn step_failed(step: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::StepFailed {
            step: step.into(),
            detail: detail.into(),
        }
    }

    /// Create a resource error for the file at `path`.
    pub fn resource(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Resource {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PipelineError::config("main.project_name is empty");
        assert_eq!(err.to_string(), "config error: main.project_name is empty");

        let err = PipelineError::step_failed("segregate", "exited with status 2");
        assert_eq!(err.to_string(), "step 'segregate' failed: exited with status 2");

        let err = PipelineError::UnknownStep {
            name: "train".into(),
        };
        assert!(err.to_string().contains("'train'"));
    }
}
