//! The fixed, ordered catalog of pipeline steps.
//!
//! Each entry pairs a step's identity with the function that builds its
//! parameters and the steps whose artifacts it consumes. The controller
//! iterates this table once, in declaration order.

use mlpipe_shared::{PipelineConfig, Result};

use crate::context::RunContext;
use crate::params::{self, PreparedStep};

/// Entry point every step exposes.
pub const MAIN_ENTRY_POINT: &str = "main";

/// Identity of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepSpec {
    /// Unique step name, as used in `main.execute_steps`.
    pub name: &'static str,
    /// Directory of the step's executable unit, relative to the project root.
    pub path: &'static str,
    /// Entry point invoked inside that unit.
    pub entry_point: &'static str,
}

/// Builds the invocation for one step.
pub type BuildFn = fn(&StepSpec, &PipelineConfig, &RunContext) -> Result<PreparedStep>;

/// One row of the dispatch table.
pub struct CatalogEntry {
    pub spec: StepSpec,
    pub build: BuildFn,
    /// Steps producing the artifacts this step reads.
    pub depends_on: &'static [&'static str],
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("spec", &self.spec)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

const fn step(name: &'static str) -> StepSpec {
    StepSpec {
        name,
        path: name,
        entry_point: MAIN_ENTRY_POINT,
    }
}

/// All steps, in the order they run.
pub static CATALOG: [CatalogEntry; 6] = [
    CatalogEntry {
        spec: step("download"),
        build: params::download,
        depends_on: &[],
    },
    CatalogEntry {
        spec: step("preprocess"),
        build: params::preprocess,
        depends_on: &["download"],
    },
    CatalogEntry {
        spec: step("check_data"),
        build: params::check_data,
        depends_on: &["preprocess"],
    },
    CatalogEntry {
        spec: step("segregate"),
        build: params::segregate,
        depends_on: &["preprocess"],
    },
    CatalogEntry {
        spec: step("random_forest"),
        build: params::random_forest,
        depends_on: &["segregate"],
    },
    CatalogEntry {
        spec: step("evaluate"),
        build: params::evaluate,
        depends_on: &["segregate", "random_forest"],
    },
];

/// Look up a catalog entry by step name.
pub fn find(name: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.spec.name == name)
}

/// Step names in catalog order.
pub fn step_names() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|e| e.spec.name)
}
