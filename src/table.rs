// src/table.rs

use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};

use crate::normalize::Fips;
use crate::project::Projection;
use crate::record::CountyRecord;

/// Which slice of the canonical table a query wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum YearFilter {
    All,
    Year(i32),
}

impl YearFilter {
    fn matches(&self, year: i32) -> bool {
        match self {
            YearFilter::All => true,
            YearFilter::Year(y) => *y == year,
        }
    }
}

impl From<Option<i32>> for YearFilter {
    fn from(year: Option<i32>) -> Self {
        year.map_or(YearFilter::All, YearFilter::Year)
    }
}

/// The joined per-county-year table. Read-only once built; clones share the
/// same rows, so it can be handed to concurrent readers as is.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    records: Arc<[CountyRecord]>,
}

impl CanonicalTable {
    /// Wrap `records`, ordering them by (state, county, year).
    pub fn new(mut records: Vec<CountyRecord>) -> Self {
        records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self {
            records: records.into(),
        }
    }

    pub fn all(&self) -> &[CountyRecord] {
        &self.records
    }

    pub fn records(&self, filter: YearFilter) -> Vec<&CountyRecord> {
        self.records
            .iter()
            .filter(|r| filter.matches(r.year))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.records.iter().map(|r| r.year).max()
    }

    /// History of a single county.
    pub fn for_fips(&self, fips: &Fips) -> Vec<&CountyRecord> {
        self.records.iter().filter(|r| &r.fips == fips).collect()
    }

    /// Mean CKD rate across counties, per year. Missing (NaN) rates are
    /// skipped; a year with none left is absent.
    pub fn national_mean_by_year(&self) -> BTreeMap<i32, f64> {
        let mut acc: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
        for r in self.records.iter().filter(|r| r.ckd_rate.is_finite()) {
            let e = acc.entry(r.year).or_default();
            e.0 += r.ckd_rate;
            e.1 += 1;
        }
        acc.into_iter()
            .map(|(year, (sum, n))| (year, sum / n as f64))
            .collect()
    }

    /// A new table with the projected rows appended, for display only. The
    /// receiver is left untouched.
    pub fn with_projection(&self, projection: &Projection) -> CanonicalTable {
        let mut rows = self.records.to_vec();
        rows.extend(projection.records.iter().cloned());
        CanonicalTable::new(rows)
    }
}
