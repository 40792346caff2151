//! Advisory per-target locks backed by lock files.
//!
//! Acquiring creates `<dir>/.<name>.lock` next to the target with
//! `O_CREAT | O_EXCL` semantics, which is atomic on local filesystems and on
//! NFSv3+. The guard removes the file when dropped. A lock whose file is older
//! than the stale threshold is assumed to belong to a dead worker and is
//! broken.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// What a lock file records about its holder.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockRecord {
    pub pid: u32,
    /// Milliseconds since the Unix epoch.
    pub acquired_at_ms: u64,
}

/// Path of the lock file guarding `target`.
#[must_use]
pub fn lock_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.lock"))
}

/// A held lock. Released on drop.
#[derive(Debug)]
pub struct TargetLock {
    path: PathBuf,
}

impl TargetLock {
    /// Try to take the lock on `target` without blocking.
    ///
    /// Returns `Ok(None)` when another live holder has it. With
    /// `stale_after`, a lock file older than that is removed and acquisition
    /// is retried once.
    ///
    /// # Errors
    /// Fails on I/O errors other than the lock already existing.
    pub fn try_acquire(target: &Path, stale_after: Option<Duration>) -> Result<Option<Self>> {
        let path = lock_path_for(target);
        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    let record = LockRecord {
                        pid: std::process::id(),
                        acquired_at_ms: now_ms(),
                    };
                    let guard = Self { path };
                    serde_json::to_writer(&mut f, &record).context("serialize lock record")?;
                    f.flush()
                        .with_context(|| format!("write lock {}", guard.path.display()))?;
                    debug!(lock = %guard.path.display(), "Acquired lock");
                    return Ok(Some(guard));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if attempt == 0 && is_stale(&path, stale_after) {
                        warn!(lock = %path.display(), "Breaking stale lock");
                        match fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(e) => {
                                return Err(e).with_context(|| {
                                    format!("remove stale lock {}", path.display())
                                });
                            }
                        }
                    }
                    return Ok(None);
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("create lock {}", path.display()));
                }
            }
        }
        Ok(None)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Holder details of the lock on `target`, if one is held and readable.
    #[must_use]
    pub fn holder(target: &Path) -> Option<LockRecord> {
        let bytes = fs::read(lock_path_for(target)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != ErrorKind::NotFound
        {
            warn!(lock = %self.path.display(), error = %e, "Failed to release lock");
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn is_stale(path: &Path, stale_after: Option<Duration>) -> bool {
    let Some(limit) = stale_after else {
        return false;
    };
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age >= limit)
}
