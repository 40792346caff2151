//! Readers and writers for raw inputs and chunk outputs.

pub mod compression;
pub mod csv;
pub mod format;
pub mod parquet;
