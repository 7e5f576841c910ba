// src/project/trend.rs
//
// Short national trend line for the year-over-year chart. Independent of the
// county model in the parent module.

use serde::Serialize;
use std::collections::BTreeMap;

use super::Projection;
use crate::table::CanonicalTable;

pub const TREND_FACTOR: f64 = 1.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub year: i32,
    pub value: f64,
}

/// For each of `years`, `1.05 * mean` of the series over the two closest
/// earlier years present in it. Years without two earlier points get none.
pub fn trend_line(series: &BTreeMap<i32, f64>, years: &[i32]) -> Vec<TrendPoint> {
    years
        .iter()
        .filter_map(|&year| {
            let preceding: Vec<f64> = series.range(..year).rev().take(2).map(|(_, v)| *v).collect();
            if preceding.len() < 2 {
                return None;
            }
            let mean = preceding.iter().sum::<f64>() / preceding.len() as f64;
            Some(TrendPoint {
                year,
                value: TREND_FACTOR * mean,
            })
        })
        .collect()
}

/// Actual national means next to their trend values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub actual: Vec<TrendPoint>,
    pub trend: Vec<TrendPoint>,
}

/// Build the chart series from the canonical table, optionally extended with
/// a projection so the projected year gets its own trend point.
pub fn trend_report(table: &CanonicalTable, projection: Option<&Projection>) -> TrendReport {
    let series = match projection {
        Some(p) => table.with_projection(p).national_mean_by_year(),
        None => table.national_mean_by_year(),
    };
    let years: Vec<i32> = series.keys().copied().collect();
    TrendReport {
        actual: series
            .iter()
            .map(|(&year, &value)| TrendPoint { year, value })
            .collect(),
        trend: trend_line(&series, &years),
    }
}
