//! Parquet scanning, row counting and writing.
//!
//! - [`parquet_row_count`] answers from footer metadata alone.
//! - [`scan_parquet`] reads record batches, optionally restricted to the row
//!   groups overlapping a row window. Because overlapping groups are
//!   contiguous, the scan reports the file-level index of its first row so
//!   callers can keep row numbering exact.
//! - [`write_parquet_batches`] persists batches through `ArrowWriter`.

use anyhow::{Context, Result};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::File;
use std::ops::Range;
use std::path::Path;

/// An open Parquet scan.
pub struct ParquetScan {
    pub schema: SchemaRef,
    /// File-level row index of the first row the batches yield.
    pub first_row: u64,
    pub batches: Box<dyn Iterator<Item = Result<RecordBatch>>>,
}

/// Total rows across all row groups, read from the footer.
///
/// # Errors
/// Returns an error if the file cannot be opened or metadata cannot be read.
pub fn parquet_row_count(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(f)
        .with_context(|| format!("read parquet footer of {}", path.display()))?;
    let rows = reader.metadata().file_metadata().num_rows();
    u64::try_from(rows).with_context(|| format!("negative row count in {}", path.display()))
}

/// Row groups whose rows overlap `window`, plus the first row of the first
/// selected group.
///
/// `group_rows` holds each group's row count in file order.
#[must_use]
pub fn row_groups_overlapping(group_rows: &[u64], window: &Range<u64>) -> (Vec<usize>, u64) {
    let mut selected = Vec::new();
    let mut first_row = None;
    let mut offset = 0u64;
    for (i, &n) in group_rows.iter().enumerate() {
        let group = offset..offset + n;
        if n > 0 && group.start < window.end && window.start < group.end {
            first_row.get_or_insert(group.start);
            selected.push(i);
        }
        offset += n;
    }
    (selected, first_row.unwrap_or(offset))
}

/// Open `path` and return its schema and record batches.
///
/// With a `window`, only row groups overlapping it are decoded; rows outside
/// the window may still appear at the edges of the selected groups.
///
/// # Errors
/// Fails if the file cannot be opened or the reader cannot be built.
pub fn scan_parquet(
    path: impl AsRef<Path>,
    window: Option<Range<u64>>,
    batch_size: usize,
) -> Result<ParquetScan> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(f)
        .with_context(|| format!("open ParquetRecordBatchReader for {}", path.display()))?;
    let schema = builder.schema().clone();

    let mut first_row = 0;
    if let Some(window) = window {
        let meta = builder.metadata();
        let group_rows: Vec<u64> = meta
            .row_groups()
            .iter()
            .map(|g| g.num_rows().max(0).cast_unsigned())
            .collect();
        let (groups, first) = row_groups_overlapping(&group_rows, &window);
        first_row = first;
        builder = builder.with_row_groups(groups);
    }

    let reader = builder
        .with_batch_size(batch_size)
        .build()
        .with_context(|| format!("build parquet reader for {}", path.display()))?;
    let display = path.display().to_string();
    Ok(ParquetScan {
        schema,
        first_row,
        batches: Box::new(
            reader.map(move |b| b.with_context(|| format!("read parquet batch from {display}"))),
        ),
    })
}

/// Write `batches` under `schema` to a new Parquet file at `path`.
///
/// A table with no batches still produces a valid zero-row file.
///
/// # Errors
/// Fails if the file cannot be created or any batch fails to encode.
pub fn write_parquet_batches(
    path: impl AsRef<Path>,
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> Result<usize> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let props = WriterProperties::builder().build();
    let mut writer =
        ArrowWriter::try_new(file, schema, Some(props)).context("create ArrowWriter")?;

    let mut rows = 0;
    for batch in batches {
        writer.write(batch).context("write batch to parquet")?;
        rows += batch.num_rows();
    }
    writer.close().context("close ArrowWriter")?;
    Ok(rows)
}
