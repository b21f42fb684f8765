// ⚠️ Error Taxonomy
// Fatal errors abort the run; everything else degrades by omitting tags.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeaturizeError {
    /// A column every wave must carry is missing (e.g. no `url`, so no slug)
    #[error("wave '{wave}' is missing required column '{column}'")]
    MissingRequiredSchema { wave: String, column: String },

    #[error("license registry file {path:?} is missing column '{column}'")]
    MissingRegistryColumn { path: PathBuf, column: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
