// src/normalize.rs
//
// Key normalization shared by every source. Both sides of a join must go
// through these functions or rows silently drop.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static COUNTY_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+COUNTY$").expect("static regex"));

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Upper-case, trim and collapse internal whitespace.
pub fn normalize_state(raw: &str) -> String {
    let cleaned = clean_str(raw).to_uppercase();
    WHITESPACE.replace_all(&cleaned, " ").into_owned()
}

/// Same as [`normalize_state`], then drop a trailing `COUNTY` token.
///
/// `"Los Angeles County"` and `" los  angeles "` both become `"LOS ANGELES"`.
pub fn normalize_county(raw: &str) -> String {
    let upper = normalize_state(raw);
    COUNTY_SUFFIX.replace(&upper, "").into_owned()
}

/// Five-digit county FIPS code. Always a zero-padded string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fips(String);

impl Fips {
    pub const WIDTH: usize = 5;

    /// Parse a FIPS-like cell.
    ///
    /// Accepts values that lost their leading zeros to numeric coercion
    /// upstream (`6037`, `6037.0`) and pads them back. Rejects anything that
    /// is not 1 to 5 ASCII digits.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = clean_str(raw);
        let digits = cleaned
            .strip_suffix(".0")
            .unwrap_or(cleaned.as_str());
        if digits.is_empty()
            || digits.len() > Self::WIDTH
            || !digits.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        Some(Fips(format!("{:0>width$}", digits, width = Self::WIDTH)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two-digit state prefix.
    pub fn state_code(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for Fips {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fips {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fips::parse(&value).ok_or_else(|| format!("invalid FIPS code {:?}", value))
    }
}

impl From<Fips> for String {
    fn from(value: Fips) -> Self {
        value.0
    }
}
