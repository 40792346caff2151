mod common;

use anyhow::Result;
use common::{events, write_csv, write_csv_gz, write_parquet};
use std::fs;
use subshard::{InputFormat, discover};

#[test]
fn parquet_wins_over_csv_and_csv_gz() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    let rows = events(5);
    write_parquet(&root.join("shard.parquet"), &rows)?;
    write_csv(&root.join("shard.csv"), &rows)?;
    write_csv_gz(&root.join("shard.csv.gz"), &rows)?;

    let found = discover(root, &InputFormat::PREFERENCE)?;
    assert_eq!(found.files.len(), 1);
    assert_eq!(found.files[0].path, root.join("shard.parquet"));
    assert_eq!(found.files[0].identity, "shard");
    assert_eq!(found.files[0].format, InputFormat::Parquet);

    assert_eq!(found.skipped.len(), 2);
    let mut skipped: Vec<_> = found.skipped.iter().map(|s| s.path.clone()).collect();
    skipped.sort();
    assert_eq!(skipped, vec![root.join("shard.csv"), root.join("shard.csv.gz")]);
    assert!(found.skipped.iter().all(|s| s.kept == root.join("shard.parquet")));
    Ok(())
}

#[test]
fn csv_wins_over_csv_gz() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    write_csv(&root.join("a/x.csv"), &events(3))?;
    write_csv_gz(&root.join("a/x.csv.gz"), &events(3))?;

    let found = discover(root, &InputFormat::PREFERENCE)?;
    assert_eq!(found.files.len(), 1);
    assert_eq!(found.files[0].format, InputFormat::Csv);
    assert_eq!(found.files[0].identity, "a/x");
    assert_eq!(found.skipped.len(), 1);
    Ok(())
}

#[test]
fn nested_distinct_identities_are_all_kept() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    write_parquet(&root.join("admissions/0.parquet"), &events(2))?;
    write_csv(&root.join("admissions/1.csv"), &events(2))?;
    write_csv_gz(&root.join("labs/deep/0.csv.gz"), &events(2))?;
    // Same stem, different directory: a different shard.
    write_csv(&root.join("labs/0.csv"), &events(2))?;

    let found = discover(root, &InputFormat::PREFERENCE)?;
    let mut ids: Vec<_> = found.files.iter().map(|f| f.identity.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["admissions/0", "admissions/1", "labs/0", "labs/deep/0"]);
    assert!(found.skipped.is_empty());
    Ok(())
}

#[test]
fn unknown_extensions_are_ignored() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    fs::write(root.join("notes.txt"), "hello")?;
    fs::write(root.join("data.json"), "{}")?;
    fs::write(root.join("data.csv.bz2"), "x")?;
    write_csv(&root.join("real.csv"), &events(1))?;

    let found = discover(root, &InputFormat::PREFERENCE)?;
    assert_eq!(found.files.len(), 1);
    assert_eq!(found.files[0].identity, "real");
    Ok(())
}

#[test]
fn empty_root_finds_nothing() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let found = discover(tmp.path(), &InputFormat::PREFERENCE)?;
    assert!(found.files.is_empty());
    assert!(found.skipped.is_empty());
    Ok(())
}

#[test]
fn preference_order_is_taken_from_the_caller() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    write_parquet(&root.join("s.parquet"), &events(2))?;
    write_csv(&root.join("s.csv"), &events(2))?;

    let found = discover(root, &[InputFormat::Csv, InputFormat::Parquet])?;
    assert_eq!(found.files.len(), 1);
    assert_eq!(found.files[0].format, InputFormat::Csv);
    Ok(())
}

#[test]
fn relative_root_with_leading_cur_dir() -> Result<()> {
    let tmp = tempfile::tempdir_in(".")?;
    let name = tmp.path().file_name().expect("temp dir name");
    let root = std::path::Path::new(".").join(name).join("raw");
    write_csv(&root.join("sub/x.csv"), &events(3))?;
    write_parquet(&root.join("y.parquet"), &events(3))?;

    let found = discover(&root, &InputFormat::PREFERENCE)?;
    let mut ids: Vec<_> = found.files.iter().map(|f| f.identity.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["sub/x", "y"]);
    assert!(found.files.iter().all(|f| f.path.is_file()));
    Ok(())
}
