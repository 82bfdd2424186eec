//! Core domain types shared between the pipeline kernel and its callers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Version tag the artifact store resolves to the most recently produced version.
pub const LATEST_TAG: &str = "latest";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArtifactRef
// ---------------------------------------------------------------------------

/// Version part of an artifact reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactVersion {
    /// Whatever version was produced most recently.
    Latest,
    /// A fixed version tag such as `v3`.
    Tagged(String),
}

impl ArtifactVersion {
    /// The tag as the artifact store spells it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Latest => LATEST_TAG,
            Self::Tagged(tag) => tag,
        }
    }
}

/// A named artifact at a version, rendered as `name:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    name: String,
    version: ArtifactVersion,
}

impl ArtifactRef {
    /// Build a reference, rejecting an empty artifact name.
    pub fn new(name: impl Into<String>, version: ArtifactVersion) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineError::config("artifact name must not be empty"));
        }
        let version = match version {
            ArtifactVersion::Tagged(tag) if tag == LATEST_TAG => ArtifactVersion::Latest,
            ArtifactVersion::Tagged(tag) if tag.is_empty() => {
                return Err(PipelineError::config(format!(
                    "artifact '{name}' has an empty version tag"
                )));
            }
            other => other,
        };
        Ok(Self { name, version })
    }

    /// Reference to the most recently produced version of `name`.
    pub fn latest(name: impl Into<String>) -> Result<Self> {
        Self::new(name, ArtifactVersion::Latest)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &ArtifactVersion {
        &self.version
    }

    /// The canonical token consumed by the artifact store and by later steps.
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version.as_str())
    }
}

impl FromStr for ArtifactRef {
    type Err = PipelineError;

    /// Splits on the last `:`. A token without a tag refers to `latest`.
    fn from_str(s: &str) -> Result<Self> {
        match s.rsplit_once(':') {
            Some((name, tag)) => Self::new(name, ArtifactVersion::Tagged(tag.to_string())),
            None => Self::latest(s),
        }
    }
}

/// Resolve `name` at `version` to its reference token.
pub fn resolve_artifact(name: &str, version: ArtifactVersion) -> Result<String> {
    ArtifactRef::new(name, version).map(|r| r.token())
}

// ---------------------------------------------------------------------------
// ParamValue
// ---------------------------------------------------------------------------

/// A single step parameter value. Steps only ever see the rendered form.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<ArtifactRef> for ParamValue {
    fn from(value: ArtifactRef) -> Self {
        Self::Str(value.token())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_reference_token() {
        let r = ArtifactRef::latest("raw_data.parquet").expect("valid ref");
        assert_eq!(r.token(), "raw_data.parquet:latest");
        assert_eq!(
            resolve_artifact("raw_data.parquet", ArtifactVersion::Latest).expect("resolve"),
            r.token()
        );
    }

    #[test]
    fn tagged_reference_token() {
        let r = ArtifactRef::new("model_export", ArtifactVersion::Tagged("v3".into()))
            .expect("valid ref");
        assert_eq!(r.to_string(), "model_export:v3");
    }

    #[test]
    fn literal_latest_tag_is_the_sentinel() {
        let r = ArtifactRef::new("x.csv", ArtifactVersion::Tagged("latest".into()))
            .expect("valid ref");
        assert_eq!(r.version(), &ArtifactVersion::Latest);
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(ArtifactRef::latest("").is_err());
        assert!(ArtifactRef::latest("   ").is_err());
        assert!(resolve_artifact("", ArtifactVersion::Tagged("v1".into())).is_err());
    }

    #[test]
    fn parse_reference_tokens() {
        let r: ArtifactRef = "exercise_6/preprocessed_data.csv:latest"
            .parse()
            .expect("parse");
        assert_eq!(r.name(), "exercise_6/preprocessed_data.csv");
        assert_eq!(r.version(), &ArtifactVersion::Latest);

        let r: ArtifactRef = "data_test.csv".parse().expect("parse");
        assert_eq!(r.token(), "data_test.csv:latest");

        assert!("name:".parse::<ArtifactRef>().is_err());
        assert!(":v1".parse::<ArtifactRef>().is_err());
    }

    #[test]
    fn param_value_rendering() {
        assert_eq!(ParamValue::from("genre").to_string(), "genre");
        assert_eq!(ParamValue::from(42_i64).to_string(), "42");
        assert_eq!(ParamValue::from(0.3_f64).to_string(), "0.3");
        assert_eq!(ParamValue::from(0.05_f64).to_string(), "0.05");
    }
}
