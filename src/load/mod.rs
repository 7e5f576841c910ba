// src/load/mod.rs

pub mod delimited;
pub mod columnar;
pub mod sources;

pub use sources::{AtlasRow, CkdRow, CrosswalkRow, LoadedSources, UnemploymentRow};

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::schema::{Dataset, Format};

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Column names from the header row, exactly as the file spells them.
    pub headers: Vec<String>,
    /// Each data row, one string per field. Nulls are empty strings.
    pub rows: Vec<Vec<String>>,
}

/// Decode `bytes` into a string table according to `format`.
#[instrument(level = "debug", skip(bytes), fields(dataset = %dataset, bytes = bytes.len()))]
pub fn parse(dataset: Dataset, format: Format, bytes: Bytes) -> Result<RawTable> {
    let table = match format {
        Format::Csv => delimited::read(dataset, b',', &bytes)?,
        Format::Tsv => delimited::read(dataset, b'\t', &bytes)?,
        Format::Parquet => columnar::read(bytes)?,
    };
    debug!(
        columns = table.headers.len(),
        rows = table.rows.len(),
        "parsed"
    );
    Ok(table)
}
