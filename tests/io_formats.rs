mod common;

use anyhow::Result;
use common::{Event, events, write_csv, write_csv_gz, write_parquet};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use subshard::{
    InputFormat, ROW_IDX_NAME, ReshardError, Table, filter_to_row_chunk, scan_with_row_idx,
};

#[test]
fn row_count_per_format() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let rows = events(1234);
    let pq = tmp.path().join("a.parquet");
    let csv = tmp.path().join("a.csv");
    let gz = tmp.path().join("a.csv.gz");
    write_parquet(&pq, &rows)?;
    write_csv(&csv, &rows)?;
    write_csv_gz(&gz, &rows)?;

    assert_eq!(InputFormat::Parquet.row_count(&pq)?, 1234);
    assert_eq!(InputFormat::Csv.row_count(&csv)?, 1234);
    assert_eq!(InputFormat::CsvGz.row_count(&gz)?, 1234);
    Ok(())
}

#[test]
fn header_only_csv_has_zero_rows() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("empty.csv");
    fs::write(&path, "subject_id,code,value\n")?;
    assert_eq!(InputFormat::Csv.row_count(&path)?, 0);
    Ok(())
}

#[test]
fn csv_gz_chunk_matches_source_rows() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("labs.csv.gz");
    let rows = events(500);
    write_csv_gz(&path, &rows)?;

    let table = filter_to_row_chunk(scan_with_row_idx(&path)?, 120, 260).collect()?;
    assert_eq!(table.column_names(), vec!["subject_id", "code", "value"]);
    let got: Vec<Event> = table.to_rows()?;
    assert_eq!(got, rows[120..260].to_vec());
    Ok(())
}

#[test]
fn csv_chunk_spanning_batches() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("visits.csv");
    let rows = events(1000);
    write_csv(&path, &rows)?;

    let plan = InputFormat::Csv
        .scan(&path)
        .with_batch_size(64)
        .with_row_index(ROW_IDX_NAME);
    let got: Vec<Event> = filter_to_row_chunk(plan, 100, 900).collect()?.to_rows()?;
    assert_eq!(got, rows[100..900].to_vec());
    Ok(())
}

#[test]
fn parquet_chunk_across_row_groups() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("groups.parquet");
    let rows = events(1000);
    let table = Table::from_rows(&rows)?;

    let props = WriterProperties::builder().set_max_row_group_size(100).build();
    let mut writer = ArrowWriter::try_new(File::create(&path)?, table.schema.clone(), Some(props))?;
    for batch in &table.batches {
        writer.write(batch)?;
    }
    writer.close()?;

    for (start, end) in [(0, 100), (250, 420), (990, 1000), (0, 1000)] {
        let got: Vec<Event> = filter_to_row_chunk(scan_with_row_idx(&path)?, start, end)
            .collect()?
            .to_rows()?;
        assert_eq!(got, rows[start as usize..end as usize].to_vec(), "[{start}-{end})");
    }
    Ok(())
}

#[test]
fn written_chunk_round_trips_through_parquet() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = tmp.path().join("in.csv");
    let out = tmp.path().join("out.parquet");
    let rows = events(50);
    write_csv(&src, &rows)?;

    subshard::write_fn(filter_to_row_chunk(scan_with_row_idx(&src)?, 10, 20), &out)?;
    let back = Table::read_parquet(&out)?;
    assert!(!back.column_names().iter().any(|c| c == ROW_IDX_NAME));
    assert_eq!(back.to_rows::<Event>()?, rows[10..20].to_vec());
    Ok(())
}

#[test]
fn unsupported_suffix_fails_at_dispatch() {
    let err = scan_with_row_idx(std::path::Path::new("raw/x.feather")).unwrap_err();
    match err.downcast_ref::<ReshardError>() {
        Some(ReshardError::UnsupportedFormat { suffix }) => assert_eq!(suffix, ".feather"),
        other => panic!("unexpected error: {other:?}"),
    }
}
