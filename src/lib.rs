//! # Subshard
//!
//! Re-shards a tree of raw tabular cohort files into many smaller,
//! row-bounded Parquet files so that downstream event extraction can run with
//! higher and more even parallelism. Rows are never reordered or interpreted;
//! only their count and position matter.
//!
//! ## Pipeline
//!
//! 1. **Discovery** ([`discovery`]) - find `*.parquet`, `*.csv` and `*.csv.gz`
//!    under the raw root and keep one file per *logical shard identity* (the
//!    relative path minus its suffix), preferring Parquet, then CSV, then
//!    gzipped CSV.
//! 2. **Chunking** ([`chunking`]) - probe each file's row count and split
//!    `[0, rows)` into half-open chunks of at most `row_chunksize` rows.
//! 3. **Scheduling** ([`schedule`]) - shuffle files, and chunks within each
//!    file, with a seedable generator to spread concurrent workers across
//!    sources.
//! 4. **Compute** ([`wrapper`]) - for each chunk, read the file lazily with a
//!    row index ([`table`]), keep the chunk's rows, and write
//!    `<MEDS_cohort_dir>/sub_sharded/<identity>/[<start>-<end>).parquet`
//!    exactly once across all workers, via a per-target lock ([`lock`]) and
//!    an atomic rename.
//!
//! ## Quick Start
//!
//! ```no_run
//! use subshard::{ReshardConfig, Resharder};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let cfg = ReshardConfig {
//!     raw_cohort_dir: "data/raw".into(),
//!     meds_cohort_dir: "data/meds".into(),
//!     row_chunksize: 1_000_000,
//!     ..Default::default()
//! };
//! let report = Resharder::new(cfg)?.run()?;
//! println!("wrote {} chunks", report.computed);
//! # Ok(())
//! # }
//! ```
//!
//! Several processes may run the same command over the same directories at
//! once; [`run_workers`] does the same with threads inside one process.

pub mod chunking;
pub mod config;
pub mod discovery;
pub mod error;
pub mod io;
pub mod lock;
pub mod logging;
pub mod resharder;
pub mod schedule;
pub mod table;
pub mod wrapper;

pub use chunking::{RowChunk, row_chunks};
pub use config::ReshardConfig;
pub use discovery::{Discovery, InputFile, SkippedFile, discover, shard_identity};
pub use error::ReshardError;
pub use io::format::InputFormat;
pub use resharder::{
    ReshardReport, Resharder, output_path, run_workers, scan_with_row_idx, write_fn,
};
pub use schedule::{ShuffleRng, WorkItem, build_schedule};
pub use table::{LazyTable, ROW_IDX_NAME, Table, filter_to_row_chunk};
pub use wrapper::{WrapOptions, WrapOutcome, wrap};
