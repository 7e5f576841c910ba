// src/snapshot.rs
//
// Parquet snapshot of the canonical table. Used as the on-disk cache between
// load cycles and as an export format.

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int32Array, StringArray};
use arrow::datatypes::{Float64Type, Int32Type};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::normalize::Fips;
use crate::record::{CountyRecord, Metric};
use crate::schema::canonical_schema;
use crate::table::CanonicalTable;

const DATASET: &str = "snapshot";

/// Sidecar written next to every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub written_at: DateTime<Utc>,
    pub rows: usize,
    pub years: Vec<i32>,
}

pub fn meta_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".meta.json");
    PathBuf::from(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn to_batch(table: &CanonicalTable) -> Result<RecordBatch> {
    let rows = table.all();
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.state.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.state_abbr.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.county.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.fips.as_str()))),
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
    ];
    for metric in Metric::ALL {
        columns.push(Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| metric.get(r)),
        )));
    }
    Ok(RecordBatch::try_new(canonical_schema(), columns)?)
}

/// Write `table` to `path` as a single snappy-compressed parquet file.
/// The file is written beside the target and renamed into place.
#[instrument(level = "info", skip(table), fields(rows = table.len()))]
pub fn write(table: &CanonicalTable, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let batch = to_batch(table)?;
    let tmp = tmp_path(path);
    {
        let file = File::create(&tmp)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
    }
    fs::rename(&tmp, path)?;

    let meta = SnapshotMeta {
        written_at: Utc::now(),
        rows: table.len(),
        years: table.years(),
    };
    let file = File::create(meta_path(path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &meta).map_err(std::io::Error::from)?;

    info!(path = %path.display(), "snapshot written");
    Ok(())
}

/// Read the sidecar of a snapshot, if there is one.
pub fn read_meta(path: &Path) -> Result<Option<SnapshotMeta>> {
    let meta = meta_path(path);
    if !meta.exists() {
        return Ok(None);
    }
    let file = File::open(meta)?;
    let parsed = serde_json::from_reader(file).map_err(std::io::Error::from)?;
    Ok(Some(parsed))
}

fn check_schema(found: &arrow::datatypes::Schema) -> Result<()> {
    let expected = canonical_schema();
    let missing: Vec<String> = expected
        .fields()
        .iter()
        .filter(|f| {
            found
                .field_with_name(f.name())
                .map_or(true, |g| g.data_type() != f.data_type())
        })
        .map(|f| f.name().clone())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::SchemaMismatch {
            dataset: DATASET.to_string(),
            missing,
            found: found.fields().iter().map(|f| f.name().clone()).collect(),
        })
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch.column_by_name(name).ok_or_else(|| Error::SchemaMismatch {
        dataset: DATASET.to_string(),
        missing: vec![name.to_string()],
        found: batch.schema().fields().iter().map(|f| f.name().clone()).collect(),
    })
}

fn from_batch(batch: &RecordBatch, offset: usize, out: &mut Vec<CountyRecord>) -> Result<()> {
    let state = column(batch, "State")?.as_string::<i32>();
    let abbr = column(batch, "StateAbr")?.as_string::<i32>();
    let county = column(batch, "County")?.as_string::<i32>();
    let fips = column(batch, "FIPS")?.as_string::<i32>();
    let year = column(batch, "Year")?.as_primitive::<Int32Type>();
    let metrics = Metric::ALL
        .iter()
        .map(|m| Ok((*m, column(batch, m.column_name())?.as_primitive::<Float64Type>())))
        .collect::<Result<Vec<_>>>()?;

    for i in 0..batch.num_rows() {
        let raw_fips = fips.value(i);
        let parsed = Fips::parse(raw_fips)
            .ok_or_else(|| Error::malformed(DATASET, offset + i, "FIPS", raw_fips))?;
        let mut rec = CountyRecord {
            state: state.value(i).to_string(),
            state_abbr: abbr.value(i).to_string(),
            county: county.value(i).to_string(),
            fips: parsed,
            year: year.value(i),
            ckd_rate: f64::NAN,
            unemp_rate: f64::NAN,
            poverty_rate: f64::NAN,
            median_family_income: f64::NAN,
            proximity: Default::default(),
            demographics: Default::default(),
        };
        for (metric, values) in &metrics {
            let v = if values.is_null(i) { f64::NAN } else { values.value(i) };
            metric.set(&mut rec, v);
        }
        out.push(rec);
    }
    Ok(())
}

/// Load a snapshot written by [`write`]. Column order does not matter but
/// every canonical column must be present with its canonical type.
#[instrument(level = "info")]
pub fn read(path: &Path) -> Result<CanonicalTable> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    check_schema(builder.schema())?;
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let offset = rows.len();
        from_batch(&batch, offset, &mut rows)?;
        debug!(rows = batch.num_rows(), "snapshot batch read");
    }
    info!(rows = rows.len(), "snapshot loaded");
    Ok(CanonicalTable::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record;
    use arrow::datatypes::{DataType, Field, Schema};
    use tempfile::tempdir;

    fn table() -> CanonicalTable {
        let mut la = record("CALIFORNIA", "LOS ANGELES", "06037", 2019, 11.5);
        la.proximity.seniors.ten = 3.25;
        la.demographics.white = f64::NAN;
        CanonicalTable::new(vec![
            la,
            record("ALABAMA", "AUTAUGA", "01001", 2018, 9.0),
        ])
    }

    #[test]
    fn snapshot_preserves_rows_and_fips_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("canonical.parquet");
        let t = table();
        write(&t, &path).unwrap();
        assert!(!tmp_path(&path).exists());

        let back = read(&path).unwrap();
        assert_eq!(back.len(), 2);
        let al = &back.all()[0];
        assert_eq!(al.fips.as_str(), "01001");
        let la = &back.all()[1];
        assert_eq!(la.fips.as_str(), "06037");
        assert_eq!(la.proximity.seniors.ten, 3.25);
        assert!(la.demographics.white.is_nan());

        let meta = read_meta(&path).unwrap().unwrap();
        assert_eq!(meta.rows, 2);
        assert_eq!(meta.years, vec![2018, 2019]);
    }

    #[test]
    fn foreign_parquet_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.parquet");
        let schema = Arc::new(Schema::new(vec![Field::new("FIPS", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(arrow::array::Int64Array::from(vec![6037]))],
        )
        .unwrap();
        let mut w = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        w.write(&batch).unwrap();
        w.close().unwrap();

        match read(&path).unwrap_err() {
            Error::SchemaMismatch { missing, .. } => {
                assert!(missing.contains(&"FIPS".to_string()));
                assert!(missing.contains(&"CkdRate".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(read_meta(&path).unwrap().is_none());
    }
}
