// src/error.rs

use thiserror::Error;

/// Everything that can abort a load cycle or a projection request.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote fetch failed, timed out, or a local file could not be read.
    #[error("source `{dataset}` unavailable at {location}: {reason}")]
    SourceUnavailable {
        dataset: String,
        location: String,
        reason: String,
    },

    /// Expected columns are absent after load (upstream format drift).
    #[error("source `{dataset}` is missing columns {missing:?} (found {found:?})")]
    SchemaMismatch {
        dataset: String,
        missing: Vec<String>,
        found: Vec<String>,
    },

    /// A required cell could not be interpreted.
    #[error("source `{dataset}` row {row}, column `{column}`: cannot parse {value:?}")]
    MalformedSource {
        dataset: String,
        row: usize,
        column: String,
        value: String,
    },

    /// Several distinct FIPS codes (or canonical rows) share one join key.
    #[error("ambiguous join key ({state}, {county}) maps to {fips:?}")]
    AmbiguousJoinKey {
        state: String,
        county: String,
        fips: Vec<String>,
    },

    #[error(
        "join produced no rows ({ckd_rows} CKD rows against {crosswalk_rows} crosswalk rows); \
         check key normalization"
    )]
    JoinProducedEmptyResult {
        ckd_rows: usize,
        crosswalk_rows: usize,
    },

    #[error("invalid projection input: {0}")]
    InvalidProjectionInput(String),

    /// A query needs at least one loaded row.
    #[error("canonical table is empty; nothing to {0}")]
    EmptyTable(&'static str),

    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn unavailable(
        dataset: &str,
        location: impl std::fmt::Display,
        reason: impl std::fmt::Display,
    ) -> Self {
        Error::SourceUnavailable {
            dataset: dataset.to_string(),
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(dataset: &str, row: usize, column: &str, value: &str) -> Self {
        Error::MalformedSource {
            dataset: dataset.to_string(),
            row,
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}
