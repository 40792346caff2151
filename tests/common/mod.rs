//! Fixture writers shared by the integration tests.
#![allow(dead_code)]

use anyhow::Result;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use subshard::Table;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub subject_id: i64,
    pub code: String,
    pub value: i64,
}

pub fn events(n: i64) -> Vec<Event> {
    (0..n)
        .map(|i| Event {
            subject_id: i / 7,
            code: format!("CODE_{}", i % 13),
            value: i,
        })
        .collect()
}

fn mkdir_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn write_csv(path: &Path, rows: &[Event]) -> Result<()> {
    mkdir_parent(path)?;
    let mut w = csv::Writer::from_path(path)?;
    for r in rows {
        w.serialize(r)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_csv_gz(path: &Path, rows: &[Event]) -> Result<()> {
    mkdir_parent(path)?;
    let enc = GzEncoder::new(File::create(path)?, Compression::default());
    let mut w = csv::Writer::from_writer(enc);
    for r in rows {
        w.serialize(r)?;
    }
    w.into_inner().map_err(|e| anyhow::anyhow!("{e}"))?.finish()?;
    Ok(())
}

pub fn write_parquet(path: &Path, rows: &[Event]) -> Result<()> {
    mkdir_parent(path)?;
    Table::from_rows(rows)?.write_parquet(path)?;
    Ok(())
}

pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    Table::read_parquet(path)?.to_rows()
}

/// Visible `*.parquet` files under `dir`, sorted.
pub fn parquet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*.parquet", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut out = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        let hidden = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if path.is_file() && !hidden {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
