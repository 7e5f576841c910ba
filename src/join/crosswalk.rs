// src/join/crosswalk.rs

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{Error, Result};
use crate::load::CrosswalkRow;
use crate::normalize::Fips;

/// Name → FIPS lookup, keyed by (state, county) where state is either the
/// full name or the postal abbreviation.
#[derive(Debug, Clone)]
pub struct Crosswalk {
    by_name: BTreeMap<(String, String), Fips>,
    identity: BTreeMap<Fips, CrosswalkRow>,
}

impl Crosswalk {
    /// Build the index. Exact duplicate rows are dropped first; a key that
    /// still maps to more than one FIPS is `AmbiguousJoinKey`.
    pub fn build(rows: &[CrosswalkRow]) -> Result<Self> {
        let unique: BTreeSet<&CrosswalkRow> = rows.iter().collect();
        if unique.len() != rows.len() {
            debug!(dropped = rows.len() - unique.len(), "duplicate crosswalk rows");
        }

        let mut candidates: BTreeMap<(String, String), BTreeSet<&Fips>> = BTreeMap::new();
        let mut identity = BTreeMap::new();
        for row in &unique {
            for state in [&row.state, &row.state_abbr] {
                if state.is_empty() {
                    continue;
                }
                candidates
                    .entry((state.clone(), row.county.clone()))
                    .or_default()
                    .insert(&row.fips);
            }
            // first (sorted) spelling of a county names it in the output
            identity
                .entry(row.fips.clone())
                .or_insert_with(|| (*row).clone());
        }

        let mut by_name = BTreeMap::new();
        for ((state, county), fips) in candidates {
            if fips.len() > 1 {
                return Err(Error::AmbiguousJoinKey {
                    state,
                    county,
                    fips: fips.into_iter().map(|f| f.to_string()).collect(),
                });
            }
            if let Some(f) = fips.into_iter().next() {
                by_name.insert((state, county), f.clone());
            }
        }

        Ok(Self { by_name, identity })
    }

    pub fn resolve(&self, state: &str, county: &str) -> Option<&Fips> {
        self.by_name.get(&(state.to_string(), county.to_string()))
    }

    /// Canonical identifiers of a county.
    pub fn identity(&self, fips: &Fips) -> Option<&CrosswalkRow> {
        self.identity.get(fips)
    }

    pub fn counties(&self) -> impl Iterator<Item = &Fips> {
        self.identity.keys()
    }

    pub fn len(&self) -> usize {
        self.identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identity.is_empty()
    }
}
