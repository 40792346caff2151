//! At-most-once, crash-safe compute-and-persist.
//!
//! [`wrap`] runs `write_fn(transform_fn(read_fn(input)))` for an output path
//! only if that output is missing (or overwriting is requested) and no other
//! worker is producing it. The result is written to a hidden temporary file
//! in the output directory and renamed into place, so readers never observe
//! a partial output, and a crash leaves at most a stray temporary file.
//!
//! Concurrency relies on [`TargetLock`]: a caller that finds the target
//! locked returns [`WrapOutcome::InProgress`] and moves on. A caller that
//! wins the lock checks the target again before computing, since the
//! previous holder may have finished in between.

use crate::lock::TargetLock;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How [`wrap`] treats an existing output.
#[derive(Clone, Copy, Debug, Default)]
pub struct WrapOptions {
    /// Replace an existing output.
    pub do_overwrite: bool,
    /// Break locks older than this.
    pub stale_after: Option<Duration>,
}

/// What a [`wrap`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapOutcome {
    /// This call read, transformed and wrote the output.
    Computed,
    /// The output existed and overwriting was off; nothing was read.
    AlreadyExists,
    /// Another worker holds the output's lock; nothing was read.
    InProgress,
}

/// Compute `output` from `input` at most once across concurrent callers.
///
/// `write_fn` receives a temporary path in the output's directory and must
/// write the complete result there; the file is then renamed onto `output`.
/// The output's parent directory must already exist.
///
/// # Errors
/// Any error from `read_fn` or `write_fn`, or from locking and renaming, is
/// returned as is. The lock is released and the temporary file removed on
/// every error path.
pub fn wrap<D, O, R, X, W>(
    input: &Path,
    output: &Path,
    read_fn: R,
    write_fn: W,
    transform_fn: X,
    opts: &WrapOptions,
) -> Result<WrapOutcome>
where
    R: FnOnce(&Path) -> Result<D>,
    X: FnOnce(D) -> O,
    W: FnOnce(O, &Path) -> Result<()>,
{
    if output.is_file() && !opts.do_overwrite {
        info!(output = %output.display(), "Output exists; skipping");
        return Ok(WrapOutcome::AlreadyExists);
    }

    let Some(lock) = TargetLock::try_acquire(output, opts.stale_after)? else {
        let holder = TargetLock::holder(output);
        info!(
            output = %output.display(),
            ?holder,
            "Output is in progress by another worker; skipping"
        );
        return Ok(WrapOutcome::InProgress);
    };

    if output.is_file() && !opts.do_overwrite {
        info!(output = %output.display(), "Output was completed by another worker; skipping");
        return Ok(WrapOutcome::AlreadyExists);
    }

    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("create temporary file in {}", dir.display()))?;

    debug!(input = %input.display(), "Reading input");
    let data = read_fn(input)?;
    let result = transform_fn(data);
    write_fn(result, tmp.path())?;

    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync {}", tmp.path().display()))?;
    tmp.persist(output)
        .map_err(|e| e.error)
        .with_context(|| format!("rename into {}", output.display()))?;
    if let Ok(d) = fs::File::open(dir) {
        // Best effort: make the rename itself durable.
        let _ = d.sync_all();
    }

    drop(lock);
    Ok(WrapOutcome::Computed)
}
