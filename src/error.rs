//! Typed errors for conditions callers may want to distinguish.
//!
//! Everything else flows through [`anyhow::Error`] with path-bearing context;
//! these variants ride inside that chain and can be recovered with
//! `err.downcast_ref::<ReshardError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReshardError {
    /// A file reached per-file dispatch with a suffix no reader handles.
    #[error("unsupported file type: {suffix:?}")]
    UnsupportedFormat { suffix: String },

    /// A configuration value is out of range or missing.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A discovered file does not live under the raw cohort root.
    #[error("{} is not under {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
}
