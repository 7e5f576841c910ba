// src/record.rs

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{error::Error, normalize::Fips};

/// Supermarket-distance bands reported by the food access atlas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceBands {
    pub half: f64,
    pub one: f64,
    pub ten: f64,
    pub twenty: f64,
}

/// Population living beyond each band from the nearest supermarket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Proximity {
    pub low_income: DistanceBands,
    pub seniors: DistanceBands,
    pub snap: DistanceBands,
}

/// Racial/ethnic composition as fractions of the county population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub white: f64,
    pub black: f64,
    pub asian: f64,
    pub nhopi: f64,
    pub aian: f64,
    pub other_multiracial: f64,
    /// Mean tract count of SNAP households.
    pub snap_households: f64,
}

/// One row of the canonical table: a county in a given year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyRecord {
    pub state: String,
    pub state_abbr: String,
    pub county: String,
    pub fips: Fips,
    pub year: i32,
    pub ckd_rate: f64,
    pub unemp_rate: f64,
    pub poverty_rate: f64,
    pub median_family_income: f64,
    pub proximity: Proximity,
    pub demographics: Demographics,
}

impl CountyRecord {
    /// Ordering key of the canonical table.
    pub fn sort_key(&self) -> (&str, &str, i32) {
        (&self.state, &self.county, self.year)
    }
}

/// Population segment a proximity metric describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Segment {
    LowIncome,
    Senior,
    Snap,
}

impl Segment {
    pub fn label(&self) -> &'static str {
        match self {
            Segment::LowIncome => "Low Income Pop",
            Segment::Senior => "Senior Pop",
            Segment::Snap => "SNAP Pop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Band {
    Half,
    One,
    Ten,
    Twenty,
}

impl Band {
    pub fn label(&self) -> &'static str {
        match self {
            Band::Half => "0.5 Miles",
            Band::One => "1 Miles",
            Band::Ten => "10 Miles",
            Band::Twenty => "20 Miles",
        }
    }

    fn of(self, bands: &DistanceBands) -> f64 {
        match self {
            Band::Half => bands.half,
            Band::One => bands.one,
            Band::Ten => bands.ten,
            Band::Twenty => bands.twenty,
        }
    }

    fn of_mut(self, bands: &mut DistanceBands) -> &mut f64 {
        match self {
            Band::Half => &mut bands.half,
            Band::One => &mut bands.one,
            Band::Ten => &mut bands.ten,
            Band::Twenty => &mut bands.twenty,
        }
    }
}

/// Every numeric field of [`CountyRecord`], addressable by its column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    CkdRate,
    UnempRate,
    PovertyRate,
    MedianFamilyIncome,
    Proximity(Segment, Band),
    White,
    Black,
    Asian,
    Nhopi,
    Aian,
    OtherMultiracial,
    SnapHouseholds,
}

impl Metric {
    pub const ALL: [Metric; 23] = [
        Metric::CkdRate,
        Metric::UnempRate,
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

    /// Column name used in snapshots and on the command line.
    pub fn column_name(&self) -> &'static str {
        use Band::*;
        use Segment::*;
        match self {
            Metric::CkdRate => "CkdRate",
            Metric::UnempRate => "unEmpRate",
            Metric::PovertyRate => "PovertyRate",
            Metric::MedianFamilyIncome => "MedianFamilyIncome",
            Metric::Proximity(LowIncome, Half) => "lalowihalf",
            Metric::Proximity(LowIncome, One) => "lalowi1",
            Metric::Proximity(LowIncome, Ten) => "lalowi10",
            Metric::Proximity(LowIncome, Twenty) => "lalowi20",
            Metric::Proximity(Senior, Half) => "laseniorshalf",
            Metric::Proximity(Senior, One) => "laseniors1",
            Metric::Proximity(Senior, Ten) => "laseniors10",
            Metric::Proximity(Senior, Twenty) => "laseniors20",
            Metric::Proximity(Snap, Half) => "lasnaphalf",
            Metric::Proximity(Snap, One) => "lasnap1",
            Metric::Proximity(Snap, Ten) => "lasnap10",
            Metric::Proximity(Snap, Twenty) => "lasnap20",
            Metric::White => "TractWhite",
            Metric::Black => "TractBlack",
            Metric::Asian => "TractAsian",
            Metric::Nhopi => "TractNHOPI",
            Metric::Aian => "TractAIAN",
            Metric::OtherMultiracial => "TractOMultir",
            Metric::SnapHouseholds => "TractSNAP",
        }
    }

    pub fn get(&self, r: &CountyRecord) -> f64 {
        match self {
            Metric::CkdRate => r.ckd_rate,
            Metric::UnempRate => r.unemp_rate,
            Metric::PovertyRate => r.poverty_rate,
            Metric::MedianFamilyIncome => r.median_family_income,
            Metric::Proximity(seg, band) => band.of(segment_bands(&r.proximity, *seg)),
            Metric::White => r.demographics.white,
            Metric::Black => r.demographics.black,
            Metric::Asian => r.demographics.asian,
            Metric::Nhopi => r.demographics.nhopi,
            Metric::Aian => r.demographics.aian,
            Metric::OtherMultiracial => r.demographics.other_multiracial,
            Metric::SnapHouseholds => r.demographics.snap_households,
        }
    }

    pub fn set(&self, r: &mut CountyRecord, value: f64) {
        let slot = match self {
            Metric::CkdRate => &mut r.ckd_rate,
            Metric::UnempRate => &mut r.unemp_rate,
            Metric::PovertyRate => &mut r.poverty_rate,
            Metric::MedianFamilyIncome => &mut r.median_family_income,
            Metric::Proximity(seg, band) => {
                band.of_mut(segment_bands_mut(&mut r.proximity, *seg))
            }
            Metric::White => &mut r.demographics.white,
            Metric::Black => &mut r.demographics.black,
            Metric::Asian => &mut r.demographics.asian,
            Metric::Nhopi => &mut r.demographics.nhopi,
            Metric::Aian => &mut r.demographics.aian,
            Metric::OtherMultiracial => &mut r.demographics.other_multiracial,
            Metric::SnapHouseholds => &mut r.demographics.snap_households,
        };
        *slot = value;
    }
}

fn segment_bands(p: &Proximity, seg: Segment) -> &DistanceBands {
    match seg {
        Segment::LowIncome => &p.low_income,
        Segment::Senior => &p.seniors,
        Segment::Snap => &p.snap,
    }
}

fn segment_bands_mut(p: &mut Proximity, seg: Segment) -> &mut DistanceBands {
    match seg {
        Segment::LowIncome => &mut p.low_income,
        Segment::Senior => &mut p.seniors,
        Segment::Snap => &mut p.snap,
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Metric::ALL
            .iter()
            .find(|m| m.column_name().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| Error::UnknownMetric(wanted.to_string()))
    }
}
