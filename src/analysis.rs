// src/analysis.rs
//
// Read-only views over the canonical table used by the dashboard panels
// other than the projection itself.

use rayon::prelude::*;
use serde::Serialize;

use crate::normalize::Fips;
use crate::project::ProjectionWeights;
use crate::record::{Band, CountyRecord, Metric, Segment};
use crate::table::{CanonicalTable, YearFilter};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationRow {
    pub metric: &'static str,
    /// Population segment label for proximity metrics, the metric name otherwise.
    pub group: &'static str,
    pub distance: Option<&'static str>,
    pub coefficient: f64,
}

/// Correlation of each metric with the CKD rate, split the way the
/// dashboard shows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationTable {
    pub year: i32,
    pub proximity: Vec<CorrelationRow>,
    pub factors: Vec<CorrelationRow>,
}

/// Pearson correlation over the pairs where both values are present.
/// `None` with fewer than two pairs or zero variance on either side.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = pairs
        .iter()
        .copied()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx.sqrt() * syy.sqrt()))
}

/// Correlate every metric with `CkdRate` for one year. Metrics with no
/// variance are left out.
pub fn correlate(table: &CanonicalTable, year: i32) -> CorrelationTable {
    let rows = table.records(YearFilter::Year(year));

    let mut results: Vec<CorrelationRow> = Metric::ALL
        .par_iter()
        .filter(|m| **m != Metric::CkdRate)
        .filter_map(|m| {
            let pairs: Vec<(f64, f64)> = rows.iter().map(|r| (m.get(r), r.ckd_rate)).collect();
            let coefficient = pearson(&pairs)?;
            let (group, distance) = match m {
                Metric::Proximity(seg, band) => (seg.label(), Some(band.label())),
                other => (other.column_name(), None),
            };
            Some(CorrelationRow {
                metric: m.column_name(),
                group,
                distance,
                coefficient,
            })
        })
        .collect();
    results.sort_by(|a, b| (a.group, a.distance).cmp(&(b.group, b.distance)));

    let (proximity, factors) = results.into_iter().partition(|r| r.distance.is_some());
    CorrelationTable {
        year,
        proximity,
        factors,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub fips: Fips,
    pub state: String,
    pub county: String,
    pub value: f64,
}

/// Values of `metric` for one year, optionally for a single county, after
/// scaling the 10-mile proximity columns by the projection weights.
pub fn weighted_metric_view(
    table: &CanonicalTable,
    year: i32,
    metric: Metric,
    weights: &ProjectionWeights,
    fips: Option<&Fips>,
) -> Vec<MetricValue> {
    table
        .records(YearFilter::Year(year))
        .into_iter()
        .filter(|r| fips.map_or(true, |f| &r.fips == f))
        .map(|r| {
            let scaled = scale_proximity(r, weights);
            MetricValue {
                fips: r.fips.clone(),
                state: r.state.clone(),
                county: r.county.clone(),
                value: metric.get(&scaled),
            }
        })
        .collect()
}

fn scale_proximity(r: &CountyRecord, w: &ProjectionWeights) -> CountyRecord {
    let mut out = r.clone();
    for (seg, weight) in [
        (Segment::Senior, w.senior),
        (Segment::LowIncome, w.low_income),
        (Segment::Snap, w.snap),
    ] {
        let m = Metric::Proximity(seg, Band::Ten);
        m.set(&mut out, m.get(r) * weight);
    }
    out
}
