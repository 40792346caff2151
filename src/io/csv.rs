//! CSV scanning into Arrow batches.
//!
//! - [`csv_row_count`] streams records with the `csv` crate and never builds
//!   Arrow arrays, so it is cheap enough to run before chunking.
//! - [`scan_csv`] infers a schema from the head of the file and yields
//!   record batches.
//!
//! Every file is expected to carry a header row. Gzipped files are decoded in
//! full into memory before batching, since the stream cannot be rewound for
//! the second pass after schema inference.

use crate::io::compression::auto_detect_reader;
use crate::io::format::InputFormat;
use anyhow::{Context, Result};
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

/// Rows sampled for type inference.
pub const SCHEMA_INFERENCE_ROWS: usize = 10_000;

/// An open CSV scan: the inferred schema plus a batch iterator.
pub struct CsvScan {
    pub schema: SchemaRef,
    pub batches: Box<dyn Iterator<Item = Result<RecordBatch>>>,
}

fn open_decoded(path: &Path) -> Result<Box<dyn Read>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))
}

/// Count data rows (header excluded) by streaming records.
///
/// Compressed inputs are decompressed front to back.
///
/// # Errors
/// Returns an error if the file cannot be opened or a record is malformed.
pub fn csv_row_count(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(open_decoded(path)?);
    let mut record = csv::ByteRecord::new();
    let mut total: u64 = 0;
    while rdr
        .read_byte_record(&mut record)
        .with_context(|| format!("read CSV record #{} in {}", total + 1, path.display()))?
    {
        total += 1;
    }
    Ok(total)
}

/// Open `path` as CSV and return its schema and batches of `batch_size` rows.
///
/// # Errors
/// Fails if the file cannot be read or the schema cannot be inferred. Parse
/// errors in later rows surface from the batch iterator.
pub fn scan_csv(path: impl AsRef<Path>, format: InputFormat, batch_size: usize) -> Result<CsvScan> {
    let path = path.as_ref();
    let csv_format = Format::default().with_header(true);

    if format.is_seekable() {
        let (schema, _) = csv_format
            .clone()
            .infer_schema(open_decoded(path)?, Some(SCHEMA_INFERENCE_ROWS))
            .with_context(|| format!("infer CSV schema of {}", path.display()))?;
        let schema = Arc::new(schema);
        let reader = ReaderBuilder::new(schema.clone())
            .with_format(csv_format)
            .with_batch_size(batch_size)
            .build(open_decoded(path)?)
            .with_context(|| format!("build CSV reader for {}", path.display()))?;
        let display = path.display().to_string();
        return Ok(CsvScan {
            schema,
            batches: Box::new(
                reader.map(move |b| b.with_context(|| format!("read CSV batch from {display}"))),
            ),
        });
    }

    let mut bytes = Vec::new();
    open_decoded(path)?
        .read_to_end(&mut bytes)
        .with_context(|| format!("decompress {}", path.display()))?;
    let bytes: Arc<[u8]> = bytes.into();

    let (schema, _) = csv_format
        .clone()
        .infer_schema(Cursor::new(bytes.clone()), Some(SCHEMA_INFERENCE_ROWS))
        .with_context(|| format!("infer CSV schema of {}", path.display()))?;
    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_format(csv_format)
        .with_batch_size(batch_size)
        .build(Cursor::new(bytes))
        .with_context(|| format!("build CSV reader for {}", path.display()))?;
    let display = path.display().to_string();
    Ok(CsvScan {
        schema,
        batches: Box::new(
            reader.map(move |b| b.with_context(|| format!("read CSV batch from {display}"))),
        ),
    })
}
