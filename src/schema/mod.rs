pub mod arrow;
pub mod types;

pub use self::arrow::{canonical_schema, IDENTIFIER_COLUMNS};
pub use types::{Dataset, Format};

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::normalize::clean_str;

/// Positions of the expected columns inside one loaded table, resolved by
/// header name. Sources are never read by position.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    dataset: Dataset,
    positions: HashMap<&'static str, usize>,
}

impl ColumnIndex {
    /// Match `headers` against `dataset`'s expected columns.
    ///
    /// `renames` maps an expected name to the header the upstream file
    /// actually uses. Matching ignores case, surrounding whitespace, quotes
    /// and a UTF-8 byte-order mark.
    pub fn resolve(
        dataset: Dataset,
        headers: &[String],
        renames: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let cleaned: Vec<String> = headers
            .iter()
            .map(|h| clean_str(h.trim_start_matches('\u{feff}')))
            .collect();

        let mut positions = HashMap::new();
        let mut missing = Vec::new();
        for &expected in dataset.expected_columns() {
            let wanted = renames
                .get(expected)
                .map(String::as_str)
                .unwrap_or(expected);
            match cleaned.iter().position(|h| h.eq_ignore_ascii_case(wanted)) {
                Some(i) => {
                    positions.insert(expected, i);
                }
                None => missing.push(wanted.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(Error::SchemaMismatch {
                dataset: dataset.to_string(),
                missing,
                found: cleaned,
            });
        }
        Ok(Self { dataset, positions })
    }

    pub fn dataset(&self) -> Dataset {
        self.dataset
    }

    /// Cell of `row` under the expected column `name`; short rows read as empty.
    pub fn cell<'a>(&self, row: &'a [String], name: &str) -> &'a str {
        self.positions
            .get(name)
            .and_then(|&i| row.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}
