//! Input discovery and logical-shard deduplication.
//!
//! A file's *logical shard identity* is its path relative to the raw cohort
//! root with the format suffix removed, so `a/b/c.csv.gz`, `a/b/c.csv` and
//! `a/b/c.parquet` all name the shard `a/b/c`. Only the format suffix is
//! removed, so dotted stems such as `v.2020.csv` and `v.2021.csv` stay
//! distinct shards. Discovery keeps at most one file per identity, taking
//! formats in the order given.

use crate::error::ReshardError;
use crate::io::format::InputFormat;
use anyhow::{Context, Result};
use glob::Pattern;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// A raw input accepted for resharding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    /// Logical shard identity, `/`-separated.
    pub identity: String,
    pub format: InputFormat,
}

/// A file passed over because its identity was already claimed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub identity: String,
    /// The accepted file that holds the identity.
    pub kept: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct Discovery {
    pub files: Vec<InputFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Logical shard identity of `path` under `root` for a file in `format`.
///
/// # Errors
/// Returns [`ReshardError::OutsideRoot`] if `path` is not below `root`, and an
/// error if the name does not end in the format's extension or is not UTF-8.
pub fn shard_identity(root: &Path, path: &Path, format: InputFormat) -> Result<String> {
    let relative = without_cur_dir(path);
    let relative = relative
        .strip_prefix(without_cur_dir(root))
        .map_err(|_| ReshardError::OutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .with_context(|| format!("non UTF-8 path {}", path.display()))?,
            ),
            Component::CurDir => {}
            _ => anyhow::bail!("unexpected path component in {}", relative.display()),
        }
    }
    let file_name = parts
        .pop()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let stem = format.strip_extension(file_name).with_context(|| {
        format!("{} does not end in .{}", path.display(), format.extension())
    })?;
    parts.push(stem);
    Ok(parts.join("/"))
}

// `glob` yields `raw/x.csv` for the pattern `./raw/**/*.csv`.
fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Every file under `root` ending in `.{format}`, sorted.
///
/// # Errors
/// Fails on an invalid pattern or an unreadable directory entry.
pub fn find_files(root: &Path, format: InputFormat) -> Result<Vec<PathBuf>> {
    let root = without_cur_dir(root);
    let root = if root.as_os_str().is_empty() { Path::new(".") } else { root.as_path() };
    let pattern = format!(
        "{}/**/*.{}",
        Pattern::escape(&root.to_string_lossy()),
        format.extension()
    );
    let paths = glob::glob(&pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut out = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Find inputs under `root`, keeping one file per logical shard identity.
///
/// `formats` is most-preferred first. Every shed duplicate is logged at
/// `warn` and listed in [`Discovery::skipped`]. Files with other suffixes are
/// never matched.
///
/// # Errors
/// Fails if the tree cannot be walked.
pub fn discover(root: &Path, formats: &[InputFormat]) -> Result<Discovery> {
    let mut out = Discovery::default();
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();

    for &format in formats {
        for path in find_files(root, format)? {
            let identity = shard_identity(root, &path, format)?;
            if let Some(kept) = claimed.get(&identity) {
                warn!(
                    skipped = %path.display(),
                    kept = %kept.display(),
                    "Skipping file as it has already been added in a preferred format"
                );
                out.skipped.push(SkippedFile {
                    path,
                    identity,
                    kept: kept.clone(),
                });
            } else {
                claimed.insert(identity.clone(), path.clone());
                out.files.push(InputFile {
                    path,
                    identity,
                    format,
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_strips_root_and_suffix() -> Result<()> {
        let root = Path::new("/a/b/c");
        assert_eq!(
            shard_identity(root, Path::new("/a/b/c/d.parquet"), InputFormat::Parquet)?,
            "d"
        );
        assert_eq!(
            shard_identity(root, Path::new("/a/b/c/d/e.csv.gz"), InputFormat::CsvGz)?,
            "d/e"
        );
        assert_eq!(
            shard_identity(root, Path::new("/a/b/c/d/v.2020.csv"), InputFormat::Csv)?,
            "d/v.2020"
        );
        Ok(())
    }

    #[test]
    fn identity_ignores_leading_cur_dir() -> Result<()> {
        let csv = InputFormat::Csv;
        let id = shard_identity(Path::new("./raw"), Path::new("raw/sub/x.csv"), csv)?;
        assert_eq!(id, "sub/x");
        let id = shard_identity(Path::new("raw"), Path::new("./raw/y.csv"), csv)?;
        assert_eq!(id, "y");
        let id = shard_identity(Path::new("."), Path::new("z.csv.gz"), InputFormat::CsvGz)?;
        assert_eq!(id, "z");
        Ok(())
    }

    #[test]
    fn identity_outside_root_is_an_error() {
        let err = shard_identity(Path::new("/a"), Path::new("/b/x.csv"), InputFormat::Csv)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReshardError>(),
            Some(ReshardError::OutsideRoot { .. })
        ));
    }
}
