//! Randomized work ordering.
//!
//! Chunks of one input file processed back to back by independent workers
//! pile reads onto the same file; gzipped CSV makes this worse because every
//! read decodes from the start. Shuffling files relative to each other, and
//! chunks within each file, spreads concurrent workers across sources. The
//! order carries no meaning: every work item targets its own output.
//!
//! The shuffle is driven by an explicit [`ShuffleRng`] so tests can fix the
//! seed.

use crate::chunking::RowChunk;
use crate::discovery::InputFile;
use std::time::{SystemTime, UNIX_EPOCH};

/// `SplitMix64` generator: small, seedable and good enough for shuffling.
#[derive(Clone, Copy, Debug)]
pub struct ShuffleRng {
    state: u64,
}

impl ShuffleRng {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seed from the clock and process id so concurrent workers diverge.
    #[must_use]
    pub fn from_entropy() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);
        let mut rng = Self::new(nanos ^ (u64::from(std::process::id()) << 32));
        rng.next_u64();
        rng
    }

    #[inline]
    pub const fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `[0, bound)` by widening multiply. `bound` must be non-zero.
    #[inline]
    fn below(&mut self, bound: usize) -> usize {
        ((u128::from(self.next_u64()) * bound as u128) >> 64) as usize
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}

/// One unit of resharding work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    pub file: InputFile,
    pub chunk: RowChunk,
}

/// Work items for one file, chunks in random order.
#[must_use]
pub fn shuffled_chunks(
    file: &InputFile,
    mut chunks: Vec<RowChunk>,
    rng: &mut ShuffleRng,
) -> Vec<WorkItem> {
    rng.shuffle(&mut chunks);
    chunks
        .into_iter()
        .map(|chunk| WorkItem {
            file: file.clone(),
            chunk,
        })
        .collect()
}

/// Full schedule: files in random order, each file's chunks shuffled
/// independently. Every chunk appears exactly once.
#[must_use]
pub fn build_schedule(
    mut files: Vec<(InputFile, Vec<RowChunk>)>,
    rng: &mut ShuffleRng,
) -> Vec<WorkItem> {
    rng.shuffle(&mut files);
    let mut out = Vec::new();
    for (file, chunks) in files {
        out.extend(shuffled_chunks(&file, chunks, rng));
    }
    out
}
