//! Fixtures shared by the unit tests in this crate.

use serde_json::json;
use tempfile::TempDir;

use mlpipe_shared::{PipelineConfig, config_from_tree};

use crate::context::RunContext;

pub(crate) fn sample_config() -> PipelineConfig {
    config_from_tree(json!({
        "main": {
            "project_name": "genre_classification",
            "experiment_name": "dev",
            "execute_steps": [
                "download", "preprocess", "check_data",
                "segregate", "random_forest", "evaluate"
            ],
            "random_seed": 42
        },
        "data": {
            "file_url": "https://example.com/genres_mod.parquet",
            "reference_dataset": "genre_classification/preprocessed_data.csv:latest",
            "ks_alpha": 0.05,
            "test_size": 0.3,
            "stratify": "genre"
        },
        "random_forest_pipeline": {
            "export_artifact": "model_export",
            "random_forest": {
                "n_estimators": 100,
                "max_depth": 13,
                "min_samples_split": 2,
                "criterion": "gini",
                "max_features": 0.5
            },
            "tfidf": { "max_features": 10 },
            "features": {
                "numerical": ["danceability", "energy", "loudness"],
                "categorical": ["time_signature", "key"],
                "nlp": ["text_feature"]
            }
        }
    }))
    .expect("sample config is valid")
}

/// A run context rooted at a fresh temporary directory. Keep the `TempDir`
/// alive for as long as the context is used.
pub(crate) fn sample_context() -> (TempDir, RunContext) {
    let dir = TempDir::new().expect("tempdir");
    let ctx = RunContext::initialize(&sample_config(), Some(dir.path())).expect("run context");
    (dir, ctx)
}
