//! The resharding driver.
//!
//! One [`Resharder`] walks the raw cohort tree, splits every input into row
//! chunks and hands each chunk to [`wrap`]. Any number of resharders,
//! in one process or many, may run over the same roots at once: they share
//! nothing but the output tree, and each chunk is written at most once.
//!
//! Outputs land at
//! `<MEDS_cohort_dir>/sub_sharded/<shard identity>/[<start>-<end>).parquet`.

use crate::chunking::{RowChunk, row_chunks};
use crate::config::ReshardConfig;
use crate::discovery::{Discovery, InputFile, discover};
use crate::io::format::InputFormat;
use crate::schedule::{ShuffleRng, WorkItem, build_schedule, shuffled_chunks};
use crate::table::{LazyTable, ROW_IDX_NAME, Table, filter_to_row_chunk};
use crate::wrapper::{WrapOptions, WrapOutcome, wrap};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs::create_dir_all;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Open `path` lazily with the row-index column attached, choosing the
/// reader by suffix.
///
/// # Errors
/// Returns [`crate::ReshardError::UnsupportedFormat`] for unknown suffixes.
pub fn scan_with_row_idx(path: &Path) -> Result<LazyTable> {
    let format = InputFormat::from_path(path)?;
    match format {
        InputFormat::CsvGz => {
            debug!(path = %path.display(), "Reading as compressed CSV");
            warn!("Reading compressed CSV files may be slow and limit parallelizability");
        }
        InputFormat::Csv => debug!(path = %path.display(), "Reading as CSV"),
        InputFormat::Parquet => debug!(path = %path.display(), "Reading as Parquet"),
    }
    Ok(format.scan(path).with_row_index(ROW_IDX_NAME))
}

/// Materialize `table` and write it as Parquet to `path`.
///
/// # Errors
/// Fails if the plan cannot be executed or the file cannot be written.
pub fn write_fn(table: LazyTable, path: &Path) -> Result<()> {
    let table: Table = table.collect()?;
    table.write_parquet(path)?;
    Ok(())
}

/// Directory holding every chunk of one logical shard.
#[must_use]
pub fn shard_output_dir(meds_cohort_dir: &Path, identity: &str) -> PathBuf {
    identity
        .split('/')
        .fold(meds_cohort_dir.join("sub_sharded"), |dir, part| dir.join(part))
}

/// Output file for one chunk of one logical shard.
#[must_use]
pub fn output_path(meds_cohort_dir: &Path, identity: &str, chunk: RowChunk) -> PathBuf {
    shard_output_dir(meds_cohort_dir, identity).join(format!("{chunk}.parquet"))
}

/// Counts from one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReshardReport {
    /// Input files accepted after deduplication.
    pub files: usize,
    /// Work items dispatched.
    pub chunks: usize,
    pub computed: usize,
    pub already_existed: usize,
    pub in_progress: usize,
    /// Files shed as lower-preference duplicates.
    pub skipped_duplicates: usize,
}

impl ReshardReport {
    /// True when no chunk was left to a lock holder.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.in_progress == 0
    }

    /// Log the counts, and warn if any chunk was skipped because of a lock.
    pub fn log_summary(&self) {
        info!(
            files = self.files,
            chunks = self.chunks,
            computed = self.computed,
            already_existed = self.already_existed,
            in_progress = self.in_progress,
            skipped_duplicates = self.skipped_duplicates,
            "Done"
        );
        if !self.is_complete() {
            warn!(
                in_progress = self.in_progress,
                "Some row-chunks were locked by another worker and have no output yet; \
                 rerun once that worker finishes or its lock goes stale"
            );
        }
    }

    fn record(&mut self, outcome: WrapOutcome) {
        self.chunks += 1;
        match outcome {
            WrapOutcome::Computed => self.computed += 1,
            WrapOutcome::AlreadyExists => self.already_existed += 1,
            WrapOutcome::InProgress => self.in_progress += 1,
        }
    }
}

impl AddAssign for ReshardReport {
    fn add_assign(&mut self, rhs: Self) {
        self.files += rhs.files;
        self.chunks += rhs.chunks;
        self.computed += rhs.computed;
        self.already_existed += rhs.already_existed;
        self.in_progress += rhs.in_progress;
        self.skipped_duplicates += rhs.skipped_duplicates;
    }
}

/// A single resharding worker.
#[derive(Clone, Debug)]
pub struct Resharder {
    config: ReshardConfig,
    rng: ShuffleRng,
}

impl Resharder {
    /// Build a worker. The shuffle seed comes from `config.seed` if set.
    ///
    /// # Errors
    /// Fails if the config does not validate.
    pub fn new(config: ReshardConfig) -> Result<Self> {
        config.validate()?;
        let rng = config.seed.map_or_else(ShuffleRng::from_entropy, ShuffleRng::new);
        Ok(Self { config, rng })
    }

    /// Override the shuffle seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ShuffleRng::new(seed);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ReshardConfig {
        &self.config
    }

    /// Discover inputs in format-preference order.
    ///
    /// # Errors
    /// Fails if the raw tree cannot be walked.
    pub fn discover(&self) -> Result<Discovery> {
        discover(&self.config.raw_cohort_dir, &InputFormat::PREFERENCE)
    }

    fn chunks_for(&self, file: &InputFile) -> Result<Vec<RowChunk>> {
        let rows = file
            .format
            .row_count(&file.path)
            .with_context(|| format!("count rows of {}", file.path.display()))?;
        Ok(row_chunks(rows, self.config.row_chunksize))
    }

    /// Probe every input and return the full schedule without writing
    /// anything.
    ///
    /// # Errors
    /// Fails if discovery or any row-count probe fails.
    pub fn plan(&mut self) -> Result<Vec<WorkItem>> {
        let discovery = self.discover()?;
        let mut per_file = Vec::with_capacity(discovery.files.len());
        for file in discovery.files {
            let chunks = self.chunks_for(&file)?;
            per_file.push((file, chunks));
        }
        Ok(build_schedule(per_file, &mut self.rng))
    }

    /// Reshard every discovered input.
    ///
    /// Files are visited in random order and each file is probed only when
    /// reached, so work starts before every input has been counted.
    ///
    /// # Errors
    /// The first failing file or chunk aborts this worker; chunks already
    /// written stay valid.
    pub fn run(&mut self) -> Result<ReshardReport> {
        let raw = &self.config.raw_cohort_dir;
        let meds = self.config.meds_cohort_dir.clone();
        let discovery = self.discover()?;
        let mut report = ReshardReport {
            files: discovery.files.len(),
            skipped_duplicates: discovery.skipped.len(),
            ..Default::default()
        };

        info!(files = report.files, "Starting event sub-sharding");
        info!(
            "Will read raw data from {}/$IN_FILE and write sub-sharded data to \
             {}/$IN_FILE/[$ROW_START-$ROW_END).parquet",
            raw.display(),
            self.config.sub_sharded_dir().display()
        );

        let opts = WrapOptions {
            do_overwrite: self.config.do_overwrite,
            stale_after: self.config.lock_stale_after(),
        };

        let mut files = discovery.files;
        self.rng.shuffle(&mut files);

        for file in files {
            let out_dir = shard_output_dir(&meds, &file.identity);
            create_dir_all(&out_dir).with_context(|| format!("mkdir -p {}", out_dir.display()))?;
            info!(input = %file.path.display(), out_dir = %out_dir.display(), "Processing file");

            let chunks = self.chunks_for(&file)?;
            info!(
                input = %file.path.display(),
                chunks = chunks.len(),
                row_chunksize = self.config.row_chunksize,
                "Splitting file into row-chunks"
            );

            for item in shuffled_chunks(&file, chunks, &mut self.rng) {
                report.record(self.process(&item, &opts)?);
            }
        }

        info!(?report, "Finished event sub-sharding");
        Ok(report)
    }

    fn process(&self, item: &WorkItem, opts: &WrapOptions) -> Result<WrapOutcome> {
        let WorkItem { file, chunk } = item;
        let out = output_path(&self.config.meds_cohort_dir, &file.identity, *chunk);
        info!(input = %file.path.display(), %chunk, output = %out.display(), "Writing row-chunk");
        let (start, end) = (chunk.start, chunk.end);
        wrap(
            &file.path,
            &out,
            scan_with_row_idx,
            write_fn,
            move |t| filter_to_row_chunk(t, start, end),
            opts,
        )
        .with_context(|| format!("write {} row-chunk {chunk}", file.path.display()))
    }
}

/// Run `workers` independent resharders in parallel on a dedicated thread
/// pool and sum their reports.
///
/// Each worker gets its own seed (derived from `config.seed` when set) and
/// shares nothing with the others.
///
/// # Errors
/// Fails if the pool cannot be built or any worker fails.
pub fn run_workers(config: &ReshardConfig, workers: usize) -> Result<ReshardReport> {
    config.validate()?;
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("subshard-worker-{i}"))
        .build()
        .context("build worker pool")?;

    let reports = pool.install(|| {
        (0..workers)
            .into_par_iter()
            .map(|w| -> Result<ReshardReport> {
                let mut cfg = config.clone();
                cfg.seed = config.seed.map(|s| s.wrapping_add(w as u64));
                let mut resharder = Resharder::new(cfg)?;
                if config.seed.is_none() {
                    let seed = ShuffleRng::from_entropy().next_u64() ^ (w as u64);
                    resharder = resharder.with_seed(seed);
                }
                resharder.run()
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut total = ReshardReport::default();
    for r in reports {
        total += r;
    }
    Ok(total)
}
