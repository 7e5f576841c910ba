// src/load/sources.rs
//
// Typed views of each upstream dataset, built once at load time.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::RawTable;
use crate::config::Sources;
use crate::error::{Error, Result};
use crate::normalize::{normalize_county, normalize_state, Fips};
use crate::record::{Band, Metric, Segment};
use crate::schema::{ColumnIndex, Dataset};

#[derive(Debug, Clone, PartialEq)]
pub struct CkdRow {
    pub state: String,
    pub county: String,
    pub year: i32,
    pub ckd_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrosswalkRow {
    pub state: String,
    pub state_abbr: String,
    pub county: String,
    pub fips: Fips,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnemploymentRow {
    pub fips: Fips,
    /// Max-scaled to 0–100 against the dataset's own maximum.
    pub unemp_rate: f64,
}

/// Metrics the atlas provides per census tract, in `AtlasRow::values` order.
pub const ATLAS_METRICS: [Metric; 21] = [
    Metric::PovertyRate,
    Metric::MedianFamilyIncome,
    Metric::Proximity(Segment::LowIncome, Band::Half),
    Metric::Proximity(Segment::LowIncome, Band::One),
    Metric::Proximity(Segment::LowIncome, Band::Ten),
    Metric::Proximity(Segment::LowIncome, Band::Twenty),
    Metric::Proximity(Segment::Senior, Band::Half),
    Metric::Proximity(Segment::Senior, Band::One),
    Metric::Proximity(Segment::Senior, Band::Ten),
    Metric::Proximity(Segment::Senior, Band::Twenty),
    Metric::Proximity(Segment::Snap, Band::Half),
    Metric::Proximity(Segment::Snap, Band::One),
    Metric::Proximity(Segment::Snap, Band::Ten),
    Metric::Proximity(Segment::Snap, Band::Twenty),
    Metric::White,
    Metric::Black,
    Metric::Asian,
    Metric::Nhopi,
    Metric::Aian,
    Metric::OtherMultiracial,
    Metric::SnapHouseholds,
];

/// One census tract of the food access atlas. Empty cells are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasRow {
    pub state: String,
    pub county: String,
    pub population: Option<f64>,
    pub values: [Option<f64>; ATLAS_METRICS.len()],
}

/// All four datasets, typed and key-normalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedSources {
    pub ckd: Vec<CkdRow>,
    pub crosswalk: Vec<CrosswalkRow>,
    pub unemployment: Vec<UnemploymentRow>,
    pub atlas: Vec<AtlasRow>,
}

impl LoadedSources {
    /// Validate and type every raw table. A missing table is reported as
    /// unavailable; missing columns are a `SchemaMismatch`.
    pub fn from_tables(
        mut tables: BTreeMap<Dataset, RawTable>,
        sources: &Sources,
    ) -> Result<Self> {
        let mut take = |dataset: Dataset| -> Result<(RawTable, ColumnIndex)> {
            let spec = sources.get(dataset);
            let mut table = tables
                .remove(&dataset)
                .ok_or_else(|| Error::unavailable(dataset.as_str(), &spec.location, "not loaded"))?;
            if let Some(headers) = &spec.headers {
                relabel(dataset, &mut table, headers)?;
            }
            let index = ColumnIndex::resolve(dataset, &table.headers, &spec.columns)?;
            Ok((table, index))
        };

        let (t, idx) = take(Dataset::Ckd)?;
        let ckd = ckd_rows(&t, &idx)?;
        let (t, idx) = take(Dataset::Crosswalk)?;
        let crosswalk = crosswalk_rows(&t, &idx)?;
        let (t, idx) = take(Dataset::Unemployment)?;
        let unemployment = unemployment_rows(&t, &idx)?;
        let (t, idx) = take(Dataset::Atlas)?;
        let atlas = atlas_rows(&t, &idx)?;

        info!(
            ckd = ckd.len(),
            crosswalk = crosswalk.len(),
            unemployment = unemployment.len(),
            atlas = atlas.len(),
            "sources typed"
        );
        Ok(Self {
            ckd,
            crosswalk,
            unemployment,
            atlas,
        })
    }
}

/// Swap the file's header row for `headers`. The column count must match.
fn relabel(dataset: Dataset, table: &mut RawTable, headers: &[String]) -> Result<()> {
    if headers.len() != table.headers.len() {
        return Err(Error::SchemaMismatch {
            dataset: dataset.to_string(),
            missing: headers.to_vec(),
            found: table.headers.clone(),
        });
    }
    debug!(dataset = %dataset, from = ?table.headers, to = ?headers, "headers relabelled");
    table.headers = headers.to_vec();
    Ok(())
}

fn is_missing(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_uppercase().as_str(),
        "" | "NA" | "N/A" | "NULL" | "NAN"
    )
}

fn optional_f64(dataset: Dataset, row: usize, column: &str, cell: &str) -> Result<Option<f64>> {
    if is_missing(cell) {
        return Ok(None);
    }
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| Error::malformed(dataset.as_str(), row, column, cell))
}

fn required_fips(dataset: Dataset, row: usize, column: &str, cell: &str) -> Result<Fips> {
    Fips::parse(cell).ok_or_else(|| Error::malformed(dataset.as_str(), row, column, cell))
}

fn year(dataset: Dataset, row: usize, column: &str, cell: &str) -> Result<i32> {
    let t = cell.trim();
    t.parse::<i32>()
        .ok()
        .or_else(|| {
            t.parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && v.abs() < 10_000.0)
                .map(|v| v as i32)
        })
        .ok_or_else(|| Error::malformed(dataset.as_str(), row, column, cell))
}

/// Rows with an empty prevalence cell are suppressed upstream and skipped.
pub fn ckd_rows(table: &RawTable, idx: &ColumnIndex) -> Result<Vec<CkdRow>> {
    let ds = idx.dataset();
    let mut out = Vec::with_capacity(table.rows.len());
    let mut suppressed = 0usize;
    for (i, row) in table.rows.iter().enumerate() {
        let n = i + 1;
        let Some(ckd_rate) = optional_f64(ds, n, "CkdRate", idx.cell(row, "CkdRate"))? else {
            suppressed += 1;
            continue;
        };
        out.push(CkdRow {
            state: normalize_state(idx.cell(row, "State")),
            county: normalize_county(idx.cell(row, "County")),
            year: year(ds, n, "Year", idx.cell(row, "Year"))?,
            ckd_rate,
        });
    }
    if suppressed > 0 {
        debug!(suppressed, "ckd rows without a rate skipped");
    }
    Ok(out)
}

pub fn crosswalk_rows(table: &RawTable, idx: &ColumnIndex) -> Result<Vec<CrosswalkRow>> {
    let ds = idx.dataset();
    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Ok(CrosswalkRow {
                state: normalize_state(idx.cell(row, "StateName")),
                state_abbr: normalize_state(idx.cell(row, "StateAbbr")),
                county: normalize_county(idx.cell(row, "CountyName")),
                fips: required_fips(ds, i + 1, "CountyFIPS", idx.cell(row, "CountyFIPS"))?,
            })
        })
        .collect()
}

/// Unemployment is rescaled so the worst county in the file reads 100.
pub fn unemployment_rows(table: &RawTable, idx: &ColumnIndex) -> Result<Vec<UnemploymentRow>> {
    let ds = idx.dataset();
    let mut raw = Vec::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        let n = i + 1;
        let fips = required_fips(ds, n, "fips", idx.cell(row, "fips"))?;
        let cell = idx.cell(row, "unemp");
        let value = optional_f64(ds, n, "unemp", cell)?
            .ok_or_else(|| Error::malformed(ds.as_str(), n, "unemp", cell))?;
        raw.push((fips, value));
    }
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let max = raw.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);
    if max <= 0.0 {
        return Err(Error::malformed(ds.as_str(), 0, "unemp", &max.to_string()));
    }
    Ok(raw
        .into_iter()
        .map(|(fips, v)| UnemploymentRow {
            fips,
            unemp_rate: v / max * 100.0,
        })
        .collect())
}

pub fn atlas_rows(table: &RawTable, idx: &ColumnIndex) -> Result<Vec<AtlasRow>> {
    let ds = idx.dataset();
    let mut out = Vec::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        let n = i + 1;
        let mut values = [None; ATLAS_METRICS.len()];
        for (slot, metric) in values.iter_mut().zip(ATLAS_METRICS.iter()) {
            let col = metric.column_name();
            *slot = optional_f64(ds, n, col, idx.cell(row, col))?;
        }
        out.push(AtlasRow {
            state: normalize_state(idx.cell(row, "State")),
            county: normalize_county(idx.cell(row, "County")),
            population: optional_f64(ds, n, "Pop2010", idx.cell(row, "Pop2010"))?,
            values,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn index(ds: Dataset, t: &RawTable) -> ColumnIndex {
        ColumnIndex::resolve(ds, &t.headers, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn ckd_keys_are_normalized_and_empty_rates_skipped() {
        let t = table(
            &["CkdRate", "County", "State", "Year"],
            &[
                &["14.5", "Los Angeles County", "California", "2019"],
                &["", "Kern County", "California", "2019"],
                &["12", "Autauga", "alabama", "2018.0"],
            ],
        );
        let rows = ckd_rows(&t, &index(Dataset::Ckd, &t)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].county, "LOS ANGELES");
        assert_eq!(rows[0].state, "CALIFORNIA");
        assert_eq!(rows[1].year, 2018);
    }

    #[test]
    fn relabelled_headers_feed_name_lookup() {
        // column order of the published CKD parquet
        let mut t = table(
            &["Data_Value", "LocationDesc", "StateDesc", "YearStart"],
            &[&["14.5", "Los Angeles County", "California", "2019"]],
        );
        let names: Vec<String> = ["CkdRate", "County", "State", "Year"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        relabel(Dataset::Ckd, &mut t, &names).unwrap();
        let rows = ckd_rows(&t, &index(Dataset::Ckd, &t)).unwrap();
        assert_eq!(rows[0].county, "LOS ANGELES");
        assert_eq!(rows[0].ckd_rate, 14.5);

        let mut short = table(&["a", "b", "c"], &[]);
        match relabel(Dataset::Ckd, &mut short, &names).unwrap_err() {
            Error::SchemaMismatch { dataset, found, .. } => {
                assert_eq!(dataset, "ckd");
                assert_eq!(found, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_rate_aborts_the_dataset() {
        let t = table(
            &["State", "County", "Year", "CkdRate"],
            &[&["Ohio", "Franklin", "2019", "twelve"]],
        );
        let err = ckd_rows(&t, &index(Dataset::Ckd, &t)).unwrap_err();
        match err {
            Error::MalformedSource {
                dataset,
                row,
                column,
                value,
            } => {
                assert_eq!((dataset.as_str(), row, column.as_str()), ("ckd", 1, "CkdRate"));
                assert_eq!(value, "twelve");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn crosswalk_fips_stays_padded() {
        let t = table(
            &["CountyName", "StateName", "CountyFIPS", "StateAbbr"],
            &[&["Los Angeles", "California", "6037", "CA"]],
        );
        let rows = crosswalk_rows(&t, &index(Dataset::Crosswalk, &t)).unwrap();
        assert_eq!(rows[0].fips.as_str(), "06037");
        assert_eq!(rows[0].state_abbr, "CA");
    }

    #[test]
    fn unemployment_is_max_scaled() {
        let t = table(
            &["fips", "unemp"],
            &[&["01001", "5.0"], &["06037", "10.0"], &["39049", "2.5"]],
        );
        let rows = unemployment_rows(&t, &index(Dataset::Unemployment, &t)).unwrap();
        let rates: Vec<f64> = rows.iter().map(|r| r.unemp_rate).collect();
        assert_eq!(rates, vec![50.0, 100.0, 25.0]);
    }

    #[test]
    fn atlas_reads_every_metric_column_by_name() {
        let mut headers: Vec<&str> = Dataset::Atlas.expected_columns().to_vec();
        headers.reverse();
        let mut cells: Vec<String> = headers.iter().map(|_| String::new()).collect();
        let pos = |name: &str| headers.iter().position(|h| *h == name).unwrap();
        cells[pos("State")] = "Texas".into();
        cells[pos("County")] = "Harris County".into();
        cells[pos("Pop2010")] = "4000".into();
        cells[pos("laseniors10")] = "12.5".into();
        cells[pos("TractBlack")] = "NULL".into();

        let t = RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: vec![cells],
        };
        let rows = atlas_rows(&t, &index(Dataset::Atlas, &t)).unwrap();
        let r = &rows[0];
        assert_eq!(r.county, "HARRIS");
        assert_eq!(r.population, Some(4000.0));
        let seniors10 = ATLAS_METRICS
            .iter()
            .position(|m| *m == Metric::Proximity(Segment::Senior, Band::Ten))
            .unwrap();
        assert_eq!(r.values[seniors10], Some(12.5));
        assert_eq!(r.values.iter().filter(|v| v.is_some()).count(), 1);
    }
}
