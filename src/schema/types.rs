// src/schema/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four upstream datasets the canonical table is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Ckd,
    Crosswalk,
    Unemployment,
    Atlas,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::Ckd,
        Dataset::Crosswalk,
        Dataset::Unemployment,
        Dataset::Atlas,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Ckd => "ckd",
            Dataset::Crosswalk => "crosswalk",
            Dataset::Unemployment => "unemployment",
            Dataset::Atlas => "atlas",
        }
    }

    /// Upstream header names each loader reads. A config column map may
    /// rename any of these.
    pub fn expected_columns(&self) -> &'static [&'static str] {
        match self {
            Dataset::Ckd => &["State", "County", "Year", "CkdRate"],
            Dataset::Crosswalk => &["StateName", "StateAbbr", "CountyName", "CountyFIPS"],
            Dataset::Unemployment => &["fips", "unemp"],
            Dataset::Atlas => &[
                "State",
                "County",
                "Pop2010",
                "PovertyRate",
                "MedianFamilyIncome",
                "lalowihalf",
                "lalowi1",
                "lalowi10",
                "lalowi20",
                "laseniorshalf",
                "laseniors1",
                "laseniors10",
                "laseniors20",
                "lasnaphalf",
                "lasnap1",
                "lasnap10",
                "lasnap20",
                "TractWhite",
                "TractBlack",
                "TractAsian",
                "TractNHOPI",
                "TractAIAN",
                "TractOMultir",
                "TractSNAP",
            ],
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk encoding of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Csv,
    Tsv,
    Parquet,
}

impl Format {
    /// Guess from a location's path extension. Query strings such as
    /// `?raw=true` are ignored; anything unrecognised is read as CSV.
    pub fn infer(location: &str) -> Format {
        let path = match url::Url::parse(location) {
            Ok(u) => u.path().to_string(),
            Err(_) => location.to_string(),
        };
        let ext = path
            .rsplit('.')
            .next()
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "parquet" | "pq" => Format::Parquet,
            "tsv" | "tab" => Format::Tsv,
            _ => Format::Csv,
        }
    }
}
