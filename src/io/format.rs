//! Input formats and per-suffix reader dispatch.

use crate::error::ReshardError;
use crate::io::{csv, parquet};
use crate::table::LazyTable;
use anyhow::Result;
use std::fmt;
use std::path::Path;

/// A supported raw input format, keyed on file suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Parquet,
    Csv,
    CsvGz,
}

impl InputFormat {
    /// Formats in preference order: when several files share a logical shard
    /// identity, the one in the earliest format wins.
    pub const PREFERENCE: [Self; 3] = [Self::Parquet, Self::Csv, Self::CsvGz];

    /// File extension without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
            Self::CsvGz => "csv.gz",
        }
    }

    /// Whether a reader can jump to a row range without decoding from the start.
    #[must_use]
    pub const fn is_seekable(self) -> bool {
        !matches!(self, Self::CsvGz)
    }

    /// Detect the format from a path's suffix (case-insensitive).
    ///
    /// # Errors
    /// Returns [`ReshardError::UnsupportedFormat`] naming the suffix when no
    /// format matches.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        // Longest suffix first so `x.csv.gz` is not taken for a `.gz` of something else.
        let mut by_len = Self::PREFERENCE;
        by_len.sort_by_key(|f| std::cmp::Reverse(f.extension().len()));
        for fmt in by_len {
            if name.ends_with(&format!(".{}", fmt.extension())) {
                return Ok(fmt);
            }
        }

        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Err(ReshardError::UnsupportedFormat { suffix }.into())
    }

    /// Strip this format's extension from a file name, if present.
    #[must_use]
    pub fn strip_extension(self, file_name: &str) -> Option<&str> {
        let ext = self.extension();
        let cut = file_name.len().checked_sub(ext.len() + 1)?;
        if cut == 0 || !file_name.is_char_boundary(cut) {
            return None;
        }
        let (stem, suffix) = file_name.split_at(cut);
        (suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(ext)).then_some(stem)
    }

    /// Lazily scan `path` in this format. No I/O happens until the table is
    /// collected or counted.
    #[must_use]
    pub fn scan(self, path: impl AsRef<Path>) -> LazyTable {
        LazyTable::scan(path, self)
    }

    /// Count data rows without materializing the table.
    ///
    /// Parquet answers from footer metadata; CSV variants stream records.
    ///
    /// # Errors
    /// Fails if the file cannot be opened or parsed.
    pub fn row_count(self, path: impl AsRef<Path>) -> Result<u64> {
        match self {
            Self::Parquet => parquet::parquet_row_count(path),
            Self::Csv | Self::CsvGz => csv::csv_row_count(path),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formats_by_suffix() -> Result<()> {
        assert_eq!(InputFormat::from_path("a/b.parquet")?, InputFormat::Parquet);
        assert_eq!(InputFormat::from_path("a/b.csv")?, InputFormat::Csv);
        assert_eq!(InputFormat::from_path("a/b.csv.gz")?, InputFormat::CsvGz);
        assert_eq!(InputFormat::from_path("a/B.CSV.GZ")?, InputFormat::CsvGz);
        Ok(())
    }

    #[test]
    fn unsupported_suffix_names_the_suffix() {
        let err = InputFormat::from_path("a/b.json").unwrap_err();
        match err.downcast_ref::<ReshardError>() {
            Some(ReshardError::UnsupportedFormat { suffix }) => assert_eq!(suffix, ".json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn strip_extension_only_strips_own_suffix() {
        assert_eq!(InputFormat::CsvGz.strip_extension("c.csv.gz"), Some("c"));
        assert_eq!(InputFormat::Csv.strip_extension("c.csv"), Some("c"));
        assert_eq!(InputFormat::Csv.strip_extension("c.csv.gz"), None);
        assert_eq!(InputFormat::Parquet.strip_extension("v.2020.parquet"), Some("v.2020"));
        assert_eq!(InputFormat::Parquet.strip_extension(".parquet"), None);
    }
}
