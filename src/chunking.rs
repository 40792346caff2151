//! Row-chunk boundaries.

use std::fmt;

/// A half-open interval `[start, end)` of 0-based row indices in one file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowChunk {
    pub start: u64,
    pub end: u64,
}

impl RowChunk {
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Renders as `[start-end)`, the form used in output file names.
impl fmt::Display for RowChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{})", self.start, self.end)
    }
}

/// Chunks covering `[0, row_count)` with at most `chunk_size` rows each, in
/// ascending order. Only the last chunk may be shorter. Zero rows yields no
/// chunks; a `chunk_size` of zero is treated as one.
#[must_use]
pub fn row_chunks(row_count: u64, chunk_size: u64) -> Vec<RowChunk> {
    let size = chunk_size.max(1);
    let mut out = Vec::new();
    let mut start = 0u64;
    while start < row_count {
        let end = start.saturating_add(size).min(row_count);
        out.push(RowChunk { start, end });
        start = end;
    }
    out
}
