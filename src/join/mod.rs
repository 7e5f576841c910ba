// src/join/mod.rs
//
// Builds the canonical per-county-year table. Name-keyed sources are first
// resolved to FIPS through the crosswalk; every source then becomes a
// FIPS-keyed facet and the facets are inner-joined on FIPS.

pub mod crosswalk;

pub use crosswalk::Crosswalk;

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::load::{sources::ATLAS_METRICS, AtlasRow, CkdRow, LoadedSources, UnemploymentRow};
use crate::normalize::Fips;
use crate::record::{CountyRecord, Demographics, Metric, Proximity};

/// Composition metrics: summed tract counts over summed tract population.
const COMPOSITION: [Metric; 6] = [
    Metric::White,
    Metric::Black,
    Metric::Asian,
    Metric::Nhopi,
    Metric::Aian,
    Metric::OtherMultiracial,
];

/// County-level view of the atlas. Metrics with no usable tract are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasAggregate {
    pub values: [f64; ATLAS_METRICS.len()],
    pub tracts: usize,
}

/// One FIPS-keyed input to the final inner join.
#[derive(Debug, Clone, PartialEq)]
pub enum Facet {
    /// CKD prevalence per year.
    Ckd(BTreeMap<Fips, BTreeMap<i32, f64>>),
    Unemployment(BTreeMap<Fips, f64>),
    Atlas(BTreeMap<Fips, AtlasAggregate>),
}

impl Facet {
    fn keys(&self) -> BTreeSet<&Fips> {
        match self {
            Facet::Ckd(m) => m.keys().collect(),
            Facet::Unemployment(m) => m.keys().collect(),
            Facet::Atlas(m) => m.keys().collect(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Facet::Ckd(_) => "ckd",
            Facet::Unemployment(_) => "unemployment",
            Facet::Atlas(_) => "atlas",
        }
    }
}

/// Resolve CKD rows to FIPS. Rows the crosswalk does not know are dropped.
pub fn ckd_facet(crosswalk: &Crosswalk, rows: &[CkdRow]) -> Result<Facet> {
    let mut out: BTreeMap<Fips, BTreeMap<i32, f64>> = BTreeMap::new();
    let mut unmatched = 0usize;
    for row in rows {
        let Some(fips) = crosswalk.resolve(&row.state, &row.county) else {
            unmatched += 1;
            continue;
        };
        let years = out.entry(fips.clone()).or_default();
        if years.insert(row.year, row.ckd_rate).is_some() {
            return Err(Error::AmbiguousJoinKey {
                state: row.state.clone(),
                county: row.county.clone(),
                fips: vec![format!("{} ({})", fips, row.year)],
            });
        }
    }
    debug!(matched = out.len(), unmatched, "ckd rows resolved");
    Ok(Facet::Ckd(out))
}

/// Unemployment is already FIPS-keyed; a repeated FIPS must agree with itself.
pub fn unemployment_facet(rows: &[UnemploymentRow]) -> Result<Facet> {
    let mut out = BTreeMap::new();
    for row in rows {
        match out.insert(row.fips.clone(), row.unemp_rate) {
            Some(prev) if prev != row.unemp_rate => {
                return Err(Error::AmbiguousJoinKey {
                    state: row.fips.state_code().to_string(),
                    county: String::new(),
                    fips: vec![row.fips.to_string()],
                })
            }
            _ => {}
        }
    }
    Ok(Facet::Unemployment(out))
}

/// Resolve atlas tracts to FIPS and aggregate them per county.
///
/// Composition metrics become fractions of the summed tract population;
/// everything else is the mean of the tracts that report a value.
pub fn atlas_facet(crosswalk: &Crosswalk, rows: &[AtlasRow]) -> Facet {
    #[derive(Default)]
    struct Acc {
        sums: [f64; ATLAS_METRICS.len()],
        counts: [usize; ATLAS_METRICS.len()],
        pops: [f64; ATLAS_METRICS.len()],
        tracts: usize,
    }

    let mut accs: BTreeMap<Fips, Acc> = BTreeMap::new();
    let mut unmatched = 0usize;
    for row in rows {
        let Some(fips) = crosswalk.resolve(&row.state, &row.county) else {
            unmatched += 1;
            continue;
        };
        let acc = accs.entry(fips.clone()).or_default();
        acc.tracts += 1;
        for (i, metric) in ATLAS_METRICS.iter().enumerate() {
            let Some(v) = row.values[i] else { continue };
            if COMPOSITION.contains(metric) {
                let Some(pop) = row.population else { continue };
                acc.pops[i] += pop;
            }
            acc.sums[i] += v;
            acc.counts[i] += 1;
        }
    }
    debug!(counties = accs.len(), unmatched, "atlas tracts resolved");

    let out = accs
        .into_iter()
        .map(|(fips, acc)| {
            let mut values = [f64::NAN; ATLAS_METRICS.len()];
            for (i, metric) in ATLAS_METRICS.iter().enumerate() {
                values[i] = if COMPOSITION.contains(metric) {
                    if acc.pops[i] > 0.0 {
                        acc.sums[i] / acc.pops[i]
                    } else {
                        f64::NAN
                    }
                } else if acc.counts[i] > 0 {
                    acc.sums[i] / acc.counts[i] as f64
                } else {
                    f64::NAN
                };
            }
            (
                fips,
                AtlasAggregate {
                    values,
                    tracts: acc.tracts,
                },
            )
        })
        .collect();
    Facet::Atlas(out)
}

/// Inner-join `facets` on FIPS against the crosswalk identities.
///
/// The result does not depend on the order of `facets`: the kept counties
/// are the intersection of every facet's keys, and each facet only fills its
/// own fields. Exactly one CKD facet is required since it supplies the years.
pub fn join_facets(crosswalk: &Crosswalk, facets: &[Facet]) -> Result<Vec<CountyRecord>> {
    let ckd_facets: Vec<_> = facets
        .iter()
        .filter_map(|f| match f {
            Facet::Ckd(m) => Some(m),
            _ => None,
        })
        .collect();
    let [ckd] = ckd_facets.as_slice() else {
        return Err(Error::Config(format!(
            "join needs exactly one CKD facet, got {}",
            ckd_facets.len()
        )));
    };

    let mut keys: BTreeSet<&Fips> = crosswalk.counties().collect();
    for facet in facets {
        let before = keys.len();
        let facet_keys = facet.keys();
        keys.retain(|k| facet_keys.contains(k));
        debug!(facet = facet.name(), dropped = before - keys.len(), "intersected");
    }

    let mut records = Vec::new();
    for fips in keys {
        let Some(id) = crosswalk.identity(fips) else {
            continue;
        };
        for (&year, &ckd_rate) in &ckd[fips] {
            let mut rec = CountyRecord {
                state: id.state.clone(),
                state_abbr: id.state_abbr.clone(),
                county: id.county.clone(),
                fips: fips.clone(),
                year,
                ckd_rate,
                unemp_rate: f64::NAN,
                poverty_rate: f64::NAN,
                median_family_income: f64::NAN,
                proximity: Proximity::default(),
                demographics: Demographics::default(),
            };
            for facet in facets {
                match facet {
                    Facet::Ckd(_) => {}
                    Facet::Unemployment(m) => rec.unemp_rate = m[fips],
                    Facet::Atlas(m) => {
                        for (metric, v) in ATLAS_METRICS.iter().zip(m[fips].values) {
                            metric.set(&mut rec, v);
                        }
                    }
                }
            }
            records.push(rec);
        }
    }

    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    for pair in records.windows(2) {
        if pair[0].sort_key() == pair[1].sort_key() {
            return Err(Error::AmbiguousJoinKey {
                state: pair[0].state.clone(),
                county: pair[0].county.clone(),
                fips: vec![pair[0].fips.to_string(), pair[1].fips.to_string()],
            });
        }
    }
    Ok(records)
}

/// Full join: crosswalk index, facets, inner join, emptiness check.
#[instrument(level = "info", skip(sources))]
pub fn build_canonical(sources: &LoadedSources) -> Result<Vec<CountyRecord>> {
    let crosswalk = Crosswalk::build(&sources.crosswalk)?;
    let facets = [
        ckd_facet(&crosswalk, &sources.ckd)?,
        unemployment_facet(&sources.unemployment)?,
        atlas_facet(&crosswalk, &sources.atlas),
    ];
    let records = join_facets(&crosswalk, &facets)?;
    if records.is_empty() {
        return Err(Error::JoinProducedEmptyResult {
            ckd_rows: sources.ckd.len(),
            crosswalk_rows: sources.crosswalk.len(),
        });
    }
    info!(rows = records.len(), "canonical table joined");
    Ok(records)
}
