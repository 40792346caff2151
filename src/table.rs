//! Deferred table scans and their materialized results.
//!
//! A [`LazyTable`] records *what* to read and which row-level operations to
//! apply; nothing touches the filesystem until [`LazyTable::collect`] or
//! [`LazyTable::row_count`]. This lets the chunk transform
//! ([`filter_to_row_chunk`]) stay a pure function of its input plan.
//!
//! ```no_run
//! use subshard::io::format::InputFormat;
//! use subshard::table::{filter_to_row_chunk, ROW_IDX_NAME};
//!
//! let plan = InputFormat::Csv.scan("raw/visits.csv").with_row_index(ROW_IDX_NAME);
//! let chunk = filter_to_row_chunk(plan, 3_000, 6_000).collect()?;
//! chunk.write_parquet("out/[3000-6000).parquet")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::io::csv::scan_csv;
use crate::io::format::InputFormat;
use crate::io::parquet::{scan_parquet, write_parquet_batches};
use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, BooleanArray, UInt64Array};
use arrow::compute::kernels::cmp::{gt_eq, lt};
use arrow::compute::{and, concat_batches, filter_record_batch};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_arrow::schema::{SchemaLike, TracingOptions};
use serde_arrow::{from_record_batch, to_record_batch};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the synthetic row-index column attached at scan time.
pub const ROW_IDX_NAME: &str = "__row_idx";

/// Rows per record batch when decoding inputs.
pub const DEFAULT_BATCH_SIZE: usize = 64 * 1024;

/// Keep rows `[start, end)` of the row-index column and drop that column.
///
/// Pure: it only extends the plan, so it can be handed to the compute
/// wrapper as an opaque transform.
#[must_use]
pub fn filter_to_row_chunk(table: LazyTable, start: u64, end: u64) -> LazyTable {
    table
        .filter_row_range(ROW_IDX_NAME, start, end)
        .drop_column(ROW_IDX_NAME)
}

type BatchIter = Box<dyn Iterator<Item = Result<RecordBatch>>>;

#[derive(Clone, Debug)]
enum Source {
    File { path: PathBuf, format: InputFormat },
    Memory(Table),
}

#[derive(Clone, Debug)]
struct RowRange {
    column: String,
    range: Range<u64>,
}

/// A table that has not been read yet.
#[derive(Clone, Debug)]
pub struct LazyTable {
    source: Source,
    row_index: Option<String>,
    ranges: Vec<RowRange>,
    dropped: Vec<String>,
    batch_size: usize,
}

impl LazyTable {
    /// Plan a scan of `path` in `format`.
    #[must_use]
    pub fn scan(path: impl AsRef<Path>, format: InputFormat) -> Self {
        Self::from_source(Source::File {
            path: path.as_ref().to_path_buf(),
            format,
        })
    }

    /// Plan over an already materialized table.
    #[must_use]
    pub fn from_table(table: Table) -> Self {
        Self::from_source(Source::Memory(table))
    }

    fn from_source(source: Source) -> Self {
        Self {
            source,
            row_index: None,
            ranges: Vec::new(),
            dropped: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Attach a monotonically increasing, 0-based `UInt64` row index named `name`.
    #[must_use]
    pub fn with_row_index(mut self, name: impl Into<String>) -> Self {
        self.row_index = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Keep rows whose `UInt64` column `column` lies in `[start, end)`.
    #[must_use]
    pub fn filter_row_range(mut self, column: impl Into<String>, start: u64, end: u64) -> Self {
        self.ranges.push(RowRange {
            column: column.into(),
            range: start..end,
        });
        self
    }

    /// Remove `name` from the output.
    #[must_use]
    pub fn drop_column(mut self, name: impl Into<String>) -> Self {
        self.dropped.push(name.into());
        self
    }

    /// Rows the source holds before any filtering.
    ///
    /// For files this is a metadata or streaming probe, not a full read.
    ///
    /// # Errors
    /// Fails if the source cannot be opened.
    pub fn row_count(&self) -> Result<u64> {
        match &self.source {
            Source::File { path, format } => format.row_count(path),
            Source::Memory(t) => Ok(t.num_rows() as u64),
        }
    }

    /// The intersection of all range filters on the row-index column, which
    /// the scan may use to skip data.
    fn index_window(&self) -> Option<Range<u64>> {
        let idx = self.row_index.as_deref()?;
        self.ranges
            .iter()
            .filter(|r| r.column == idx)
            .map(|r| r.range.clone())
            .reduce(|a, b| a.start.max(b.start)..a.end.min(b.end))
    }

    /// Execute the plan.
    ///
    /// # Errors
    /// Fails on any read or decode error, when a filtered column is missing or
    /// not `UInt64`, or when a dropped column does not exist.
    pub fn collect(self) -> Result<Table> {
        let window = self.index_window();
        let (source_schema, first_row, batches): (SchemaRef, u64, BatchIter) =
            match self.source {
                Source::File { path, format } => match format {
                    InputFormat::Parquet => {
                        let scan = scan_parquet(&path, window.clone(), self.batch_size)?;
                        (scan.schema, scan.first_row, scan.batches)
                    }
                    InputFormat::Csv | InputFormat::CsvGz => {
                        let scan = scan_csv(&path, format, self.batch_size)?;
                        (scan.schema, 0, scan.batches)
                    }
                },
                Source::Memory(t) => {
                    let batches: BatchIter = Box::new(t.batches.into_iter().map(Ok));
                    (t.schema, 0, batches)
                }
            };

        let indexed_schema = match &self.row_index {
            Some(name) => {
                if source_schema.column_with_name(name).is_some() {
                    bail!("row index column {name:?} collides with an existing column");
                }
                let mut fields: Vec<FieldRef> = source_schema.fields().iter().cloned().collect();
                fields.push(Arc::new(Field::new(name, DataType::UInt64, false)));
                Arc::new(Schema::new_with_metadata(
                    fields,
                    source_schema.metadata().clone(),
                ))
            }
            None => source_schema,
        };

        let mut keep = Vec::with_capacity(indexed_schema.fields().len());
        for (i, field) in indexed_schema.fields().iter().enumerate() {
            if !self.dropped.iter().any(|d| d == field.name()) {
                keep.push(i);
            }
        }
        for name in &self.dropped {
            if indexed_schema.column_with_name(name).is_none() {
                bail!("cannot drop missing column {name:?}");
            }
        }
        let out_schema = Arc::new(indexed_schema.project(&keep)?);

        let mut out = Vec::new();
        let mut offset = first_row;
        for batch in batches {
            if window.as_ref().is_some_and(|w| offset >= w.end) {
                break;
            }
            let batch = batch?;
            let n = batch.num_rows() as u64;
            let start = offset;
            offset += n;
            if window.as_ref().is_some_and(|w| start + n <= w.start) {
                continue;
            }

            let batch = match &self.row_index {
                Some(_) => {
                    let idx: ArrayRef = Arc::new(UInt64Array::from_iter_values(start..start + n));
                    let mut columns = batch.columns().to_vec();
                    columns.push(idx);
                    RecordBatch::try_new(indexed_schema.clone(), columns)
                        .context("attach row index")?
                }
                None => batch,
            };
            let batch = apply_ranges(batch, &self.ranges)?;
            if batch.num_rows() > 0 {
                out.push(batch.project(&keep)?);
            }
        }

        Ok(Table {
            schema: out_schema,
            batches: out,
        })
    }
}

fn apply_ranges(batch: RecordBatch, ranges: &[RowRange]) -> Result<RecordBatch> {
    let mut mask: Option<BooleanArray> = None;
    for r in ranges {
        let column = batch
            .column_by_name(&r.column)
            .with_context(|| format!("filter on missing column {:?}", r.column))?;
        let values = column
            .as_any()
            .downcast_ref::<UInt64Array>()
            .with_context(|| {
                format!(
                    "row range filter needs a UInt64 column, {:?} is {}",
                    r.column,
                    column.data_type()
                )
            })?;
        let lo = gt_eq(values, &UInt64Array::new_scalar(r.range.start))?;
        let hi = lt(values, &UInt64Array::new_scalar(r.range.end))?;
        let both = and(&lo, &hi)?;
        mask = Some(match mask {
            Some(m) => and(&m, &both)?,
            None => both,
        });
    }
    match mask {
        Some(m) => Ok(filter_record_batch(&batch, &m)?),
        None => Ok(batch),
    }
}

/// A materialized table: a schema and zero or more record batches.
#[derive(Clone, Debug)]
pub struct Table {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl Table {
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.schema.fields().iter().map(|f| f.name().clone()).collect()
    }

    /// Merge all batches into one.
    ///
    /// # Errors
    /// Fails if the batches disagree with the schema.
    pub fn concat(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// Persist as Parquet at `path`. Returns rows written.
    ///
    /// # Errors
    /// See [`write_parquet_batches`].
    pub fn write_parquet(&self, path: impl AsRef<Path>) -> Result<usize> {
        write_parquet_batches(path, self.schema.clone(), &self.batches)
    }

    /// Build a single-batch table from typed rows.
    ///
    /// The schema is traced from `T`, so it holds even when `rows` is empty.
    ///
    /// # Errors
    /// Fails if `T` cannot be mapped to Arrow.
    pub fn from_rows<T: Serialize + DeserializeOwned>(rows: &[T]) -> Result<Self> {
        let fields = Vec::<FieldRef>::from_type::<T>(TracingOptions::default())
            .context("infer Arrow schema from type T")?;
        let batch = to_record_batch(&fields, &rows).context("convert rows to RecordBatch")?;
        Ok(Self {
            schema: batch.schema(),
            batches: vec![batch],
        })
    }

    /// Deserialize every row into `T`.
    ///
    /// # Errors
    /// Fails if a batch does not match `T`.
    pub fn to_rows<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(self.num_rows());
        for batch in &self.batches {
            let mut rows: Vec<T> =
                from_record_batch(batch).context("deserialize RecordBatch rows to T")?;
            out.append(&mut rows);
        }
        Ok(out)
    }

    /// Read a whole Parquet file.
    ///
    /// # Errors
    /// Fails if the file cannot be read.
    pub fn read_parquet(path: impl AsRef<Path>) -> Result<Self> {
        LazyTable::scan(path, InputFormat::Parquet).collect()
    }
}
