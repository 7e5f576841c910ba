// src/project/mod.rs
//
// County-level CKD projection. The coefficients below are hand-picked
// tuning constants, not fitted to any data.

pub mod trend;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::normalize::Fips;
use crate::record::{CountyRecord, Metric};
use crate::table::CanonicalTable;

pub const SENIOR_BASE: f64 = 0.4;
pub const CKD_COEF: f64 = 0.80;
pub const UNEMP_COEF: f64 = 0.20;
pub const LOW_INCOME_COEF: f64 = 0.20;
pub const SNAP_COEF: f64 = 0.20;

pub const SENIOR_RANGE: (f64, f64) = (0.0, 1.0);
pub const LOW_INCOME_RANGE: (f64, f64) = (0.0, 1.0);
pub const SNAP_RANGE: (f64, f64) = (0.0, 10.0);

/// User-adjustable inputs of the projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionWeights {
    /// In [0, 1].
    pub senior: f64,
    /// In [0, 1].
    pub low_income: f64,
    /// In [0, 10].
    pub snap: f64,
}

impl ProjectionWeights {
    pub fn new(senior: f64, low_income: f64, snap: f64) -> Result<Self> {
        let w = Self {
            senior,
            low_income,
            snap,
        };
        w.validate()?;
        Ok(w)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value, (lo, hi)) in [
            ("senior", self.senior, SENIOR_RANGE),
            ("low_income", self.low_income, LOW_INCOME_RANGE),
            ("snap", self.snap, SNAP_RANGE),
        ] {
            if !value.is_finite() || value < lo || value > hi {
                return Err(Error::InvalidProjectionInput(format!(
                    "{} weight {} outside [{}, {}]",
                    name, value, lo, hi
                )));
            }
        }
        Ok(())
    }
}

/// Fixed-form heuristic for next-period CKD prevalence.
pub fn projected_rate(
    ckd_rate: f64,
    unemp_rate: f64,
    seniors10: f64,
    low_income10: f64,
    snap10: f64,
    w: &ProjectionWeights,
) -> f64 {
    (w.senior + SENIOR_BASE) * seniors10
        + CKD_COEF * ckd_rate
        + UNEMP_COEF * unemp_rate
        + w.low_income * LOW_INCOME_COEF * low_income10
        - w.snap * SNAP_COEF * snap10
}

/// A county left out of a projection because the lookback window holds
/// none of its rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsufficientHistory {
    pub fips: Fips,
    pub state: String,
    pub county: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub target_year: i32,
    pub weights: ProjectionWeights,
    /// One row per county, tagged with `target_year`.
    pub records: Vec<CountyRecord>,
    pub omitted: Vec<InsufficientHistory>,
}

/// Mean of every metric across `rows`, ignoring missing (NaN) values.
/// Identifiers are taken from the first row.
fn window_mean(rows: &[&CountyRecord]) -> CountyRecord {
    let mut out = rows[0].clone();
    for metric in Metric::ALL {
        let (sum, n) = rows
            .iter()
            .map(|r| metric.get(r))
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        metric.set(&mut out, if n > 0 { sum / n as f64 } else { f64::NAN });
    }
    out
}

/// Project every county to `target_year` from its rows with
/// `year > lookback_after`.
///
/// Counties with no rows in that window are reported in
/// `Projection::omitted` (and logged) instead of being zero-filled.
#[instrument(level = "info", skip(table), fields(rows = table.len()))]
pub fn project(
    table: &CanonicalTable,
    lookback_after: i32,
    target_year: i32,
    weights: ProjectionWeights,
) -> Result<Projection> {
    weights.validate()?;
    let latest = table
        .latest_year()
        .ok_or_else(|| Error::InvalidProjectionInput("canonical table is empty".into()))?;
    if target_year <= latest {
        return Err(Error::InvalidProjectionInput(format!(
            "target year {} is not after the latest observed year {}",
            target_year, latest
        )));
    }

    let mut by_county: BTreeMap<&Fips, (&CountyRecord, Vec<&CountyRecord>)> = BTreeMap::new();
    for r in table.all() {
        let entry = by_county.entry(&r.fips).or_insert_with(|| (r, Vec::new()));
        if r.year > lookback_after {
            entry.1.push(r);
        }
    }

    let mut records = Vec::with_capacity(by_county.len());
    let mut omitted = Vec::new();
    for (fips, (first, window)) in by_county {
        if window.is_empty() {
            warn!(fips = %fips, county = %first.county, lookback_after, "insufficient history; county omitted");
            omitted.push(InsufficientHistory {
                fips: fips.clone(),
                state: first.state.clone(),
                county: first.county.clone(),
            });
            continue;
        }
        let mut rec = window_mean(&window);
        rec.year = target_year;
        rec.ckd_rate = projected_rate(
            rec.ckd_rate,
            rec.unemp_rate,
            rec.proximity.seniors.ten,
            rec.proximity.low_income.ten,
            rec.proximity.snap.ten,
            &weights,
        );
        records.push(rec);
    }
    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    info!(
        projected = records.len(),
        omitted = omitted.len(),
        target_year,
        "projection complete"
    );
    Ok(Projection {
        target_year,
        weights,
        records,
        omitted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record;

    fn with_inputs(
        mut r: CountyRecord,
        unemp: f64,
        seniors10: f64,
        low10: f64,
        snap10: f64,
    ) -> CountyRecord {
        r.unemp_rate = unemp;
        r.proximity.seniors.ten = seniors10;
        r.proximity.low_income.ten = low10;
        r.proximity.snap.ten = snap10;
        r
    }

    fn table() -> CanonicalTable {
        CanonicalTable::new(vec![
            with_inputs(record("CALIFORNIA", "LOS ANGELES", "06037", 2018, 18.0), 8.0, 4.0, 2.0, 1.0),
            with_inputs(record("CALIFORNIA", "LOS ANGELES", "06037", 2019, 22.0), 12.0, 6.0, 2.0, 1.0),
            with_inputs(record("OHIO", "FRANKLIN", "39049", 2019, 10.0), 5.0, 3.0, 7.0, 9.0),
            // only observed before the lookback window
            with_inputs(record("TEXAS", "LOVING", "48301", 2012, 30.0), 5.0, 3.0, 1.0, 1.0),
        ])
    }

    #[test]
    fn documented_scenario_yields_twenty() {
        let v = projected_rate(20.0, 10.0, 5.0, 2.0, 1.0, &ProjectionWeights::default());
        assert!((v - 20.0).abs() < 1e-12, "{v}");
    }

    #[test]
    fn window_means_feed_the_model() {
        let p = project(&table(), 2015, 2024, ProjectionWeights::default()).unwrap();
        let la = p
            .records
            .iter()
            .find(|r| r.fips.as_str() == "06037")
            .unwrap();
        // means: ckd 20, unemp 10, seniors10 5 → the documented scenario
        assert!((la.ckd_rate - 20.0).abs() < 1e-12);
        assert_eq!(la.year, 2024);
        assert_eq!(la.fips.as_str(), "06037");
        assert_eq!(la.unemp_rate, 10.0);
    }

    #[test]
    fn county_without_recent_history_is_omitted_not_zero_filled() {
        let p = project(&table(), 2015, 2024, ProjectionWeights::default()).unwrap();
        assert_eq!(p.records.len(), 2);
        assert!(p.records.iter().all(|r| r.county != "LOVING"));
        assert_eq!(p.omitted.len(), 1);
        assert_eq!(p.omitted[0].fips.as_str(), "48301");
    }

    #[test]
    fn projection_is_deterministic() {
        let w = ProjectionWeights::new(0.3, 0.7, 4.0).unwrap();
        let a = project(&table(), 2015, 2024, w).unwrap();
        let b = project(&table(), 2015, 2024, w).unwrap();
        let bits = |p: &Projection| -> Vec<u64> { p.records.iter().map(|r| r.ckd_rate.to_bits()).collect() };
        assert_eq!(bits(&a), bits(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn raising_senior_weight_never_lowers_a_projection() {
        let t = table();
        let mut previous: Option<Vec<f64>> = None;
        for step in 0..=10 {
            let w = ProjectionWeights::new(step as f64 / 10.0, 0.5, 5.0).unwrap();
            let rates: Vec<f64> = project(&t, 2015, 2024, w)
                .unwrap()
                .records
                .iter()
                .map(|r| r.ckd_rate)
                .collect();
            if let Some(prev) = &previous {
                for (before, after) in prev.iter().zip(&rates) {
                    assert!(after >= before);
                }
            }
            previous = Some(rates);
        }
    }

    #[test]
    fn weights_and_target_year_are_validated() {
        assert!(ProjectionWeights::new(1.5, 0.0, 0.0).is_err());
        assert!(ProjectionWeights::new(0.0, -0.1, 0.0).is_err());
        assert!(ProjectionWeights::new(0.0, 0.0, 10.5).is_err());
        assert!(ProjectionWeights::new(f64::NAN, 0.0, 0.0).is_err());
        assert!(ProjectionWeights::new(1.0, 1.0, 10.0).is_ok());

        let err = project(&table(), 2015, 2019, ProjectionWeights::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidProjectionInput(_)));
        let empty = CanonicalTable::new(Vec::new());
        assert!(project(&empty, 2015, 2024, ProjectionWeights::default()).is_err());
    }
}
