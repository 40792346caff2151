//! Configuration for a resharding run.
//!
//! A [`ReshardConfig`] can be built in code, loaded from a JSON file with
//! [`ReshardConfig::from_json_file`], or assembled from CLI flags by the
//! `subshard` binary. Field names follow the extraction pipeline's
//! configuration (`raw_cohort_dir`, `MEDS_cohort_dir`, `row_chunksize`,
//! `do_overwrite`).
//!
//! ```no_run
//! use subshard::config::ReshardConfig;
//!
//! let cfg = ReshardConfig {
//!     raw_cohort_dir: "raw".into(),
//!     meds_cohort_dir: "out".into(),
//!     row_chunksize: 1_000_000,
//!     ..Default::default()
//! };
//! cfg.validate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::error::ReshardError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of rows per output chunk.
pub const DEFAULT_ROW_CHUNKSIZE: u64 = 200_000_000;

/// Default age after which an abandoned output lock may be broken.
pub const DEFAULT_LOCK_STALE_AFTER_SECS: u64 = 24 * 60 * 60;

/// Options read by the resharding orchestrator.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReshardConfig {
    /// Root of the raw input tree.
    pub raw_cohort_dir: PathBuf,
    /// Output root; chunks land under `<meds_cohort_dir>/sub_sharded/`.
    #[serde(alias = "MEDS_cohort_dir")]
    pub meds_cohort_dir: PathBuf,
    /// Maximum rows per output chunk. Must be positive.
    pub row_chunksize: u64,
    /// Replace existing chunk outputs instead of leaving them untouched.
    pub do_overwrite: bool,
    /// Seed for the scheduling shuffle. `None` draws a fresh seed per run.
    pub seed: Option<u64>,
    /// Locks older than this many seconds are treated as abandoned.
    /// `None` never breaks a lock.
    pub lock_stale_after_secs: Option<u64>,
}

impl Default for ReshardConfig {
    fn default() -> Self {
        Self {
            raw_cohort_dir: PathBuf::new(),
            meds_cohort_dir: PathBuf::new(),
            row_chunksize: DEFAULT_ROW_CHUNKSIZE,
            do_overwrite: false,
            seed: None,
            lock_stale_after_secs: Some(DEFAULT_LOCK_STALE_AFTER_SECS),
        }
    }
}

impl ReshardConfig {
    /// Load a config from a JSON object. Missing keys take their defaults.
    ///
    /// # Errors
    /// Fails if the file cannot be opened or is not a valid config object.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config {}", path.display()))
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns [`ReshardError::InvalidConfig`] when `row_chunksize` is zero or
    /// either directory is unset.
    pub fn validate(&self) -> Result<()> {
        if self.row_chunksize == 0 {
            return Err(ReshardError::InvalidConfig("row_chunksize must be positive".into()).into());
        }
        if self.raw_cohort_dir.as_os_str().is_empty() {
            return Err(ReshardError::InvalidConfig("raw_cohort_dir is not set".into()).into());
        }
        if self.meds_cohort_dir.as_os_str().is_empty() {
            return Err(ReshardError::InvalidConfig("MEDS_cohort_dir is not set".into()).into());
        }
        Ok(())
    }

    /// Root directory that holds every chunk output.
    #[must_use]
    pub fn sub_sharded_dir(&self) -> PathBuf {
        self.meds_cohort_dir.join("sub_sharded")
    }

    #[must_use]
    pub fn lock_stale_after(&self) -> Option<Duration> {
        self.lock_stale_after_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_accepts_pipeline_key_names() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cfg.json");
        std::fs::write(
            &path,
            r#"{
                "raw_cohort_dir": "/raw",
                "MEDS_cohort_dir": "/out",
                "row_chunksize": 10,
                "do_overwrite": true
            }"#,
        )?;
        let cfg = ReshardConfig::from_json_file(&path)?;
        assert_eq!(cfg.raw_cohort_dir, PathBuf::from("/raw"));
        assert_eq!(cfg.meds_cohort_dir, PathBuf::from("/out"));
        assert_eq!(cfg.row_chunksize, 10);
        assert!(cfg.do_overwrite);
        assert_eq!(cfg.seed, None);
        assert_eq!(cfg.lock_stale_after_secs, Some(DEFAULT_LOCK_STALE_AFTER_SECS));
        cfg.validate()
    }

    #[test]
    fn zero_chunksize_is_rejected() {
        let cfg = ReshardConfig {
            raw_cohort_dir: "raw".into(),
            meds_cohort_dir: "out".into(),
            row_chunksize: 0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReshardError>(),
            Some(ReshardError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_dirs_are_rejected() {
        assert!(ReshardConfig::default().validate().is_err());
    }
}
