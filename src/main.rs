use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use subshard::config::ReshardConfig;
use subshard::logging::init_logging;
use subshard::{Resharder, run_workers};

#[derive(Parser, Debug)]
#[command(name = "subshard")]
#[command(about = "Re-shard raw cohort files into row-chunked Parquet files")]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the raw input tree
    #[arg(long)]
    raw_cohort_dir: Option<PathBuf>,

    /// Output root; chunks are written under <dir>/sub_sharded
    #[arg(long = "meds-cohort-dir")]
    meds_cohort_dir: Option<PathBuf>,

    /// Maximum rows per output chunk
    #[arg(long)]
    row_chunksize: Option<u64>,

    /// Replace existing chunk outputs
    #[arg(long)]
    do_overwrite: bool,

    /// Seed for the scheduling shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Number of in-process workers (0 = one per CPU)
    #[arg(short, long, default_value = "1")]
    workers: usize,

    /// Print the schedule without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<ReshardConfig> {
        let mut cfg = match &self.config {
            Some(path) => ReshardConfig::from_json_file(path)?,
            None => ReshardConfig::default(),
        };
        if let Some(dir) = self.raw_cohort_dir {
            cfg.raw_cohort_dir = dir;
        }
        if let Some(dir) = self.meds_cohort_dir {
            cfg.meds_cohort_dir = dir;
        }
        if let Some(n) = self.row_chunksize {
            cfg.row_chunksize = n;
        }
        if self.do_overwrite {
            cfg.do_overwrite = true;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let workers = match args.workers {
        0 => num_cpus::get(),
        n => n,
    };
    let dry_run = args.dry_run;
    let cfg = args.into_config()?;

    if dry_run {
        for item in Resharder::new(cfg.clone())?.plan()? {
            let out = subshard::output_path(&cfg.meds_cohort_dir, &item.file.identity, item.chunk);
            println!("{}\t{}\t{}", item.file.path.display(), item.chunk, out.display());
        }
        return Ok(());
    }

    let report = if workers == 1 {
        Resharder::new(cfg)?.run()?
    } else {
        run_workers(&cfg, workers)?
    };
    report.log_summary();
    Ok(())
}
