// src/config.rs

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::{Dataset, Format};

static DEFAULT_CKD_URL: &str = "https://github.com/nmmarcelnv/cmsdatajam/blob/main/data/Prevalence_of_CKD_by_US_State_and_County_by_County_2019.parquet?raw=true";
// The published parquet's own column labels are not the names we read by;
// its columns are, in order, the rate, county, state and year.
static DEFAULT_CKD_HEADERS: [&str; 4] = ["CkdRate", "County", "State", "Year"];
static DEFAULT_CROSSWALK_URL: &str =
    "https://raw.githubusercontent.com/ChuckConnell/articles/master/fips2county.tsv";
static DEFAULT_UNEMPLOYMENT_URL: &str =
    "https://raw.githubusercontent.com/plotly/datasets/master/fips-unemp-16.csv";
// The ERS atlas ships as a spreadsheet; it is expected pre-exported to CSV.
static DEFAULT_ATLAS_PATH: &str = "data/FoodAccessResearchAtlasData2019.csv";

/// Where one dataset lives and how to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// `http(s)://` URL or a local path.
    pub location: String,
    /// Explicit format; inferred from `location` when absent.
    #[serde(default)]
    pub format: Option<Format>,
    /// Expected column name → header used by this particular file.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
    /// Replacement for the file's header row, one name per column. For
    /// files whose own headers are not usable names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<String>>,
}

impl SourceSpec {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            format: None,
            columns: BTreeMap::new(),
            headers: None,
        }
    }

    pub fn with_headers(mut self, headers: &[&str]) -> Self {
        self.headers = Some(headers.iter().map(|h| h.to_string()).collect());
        self
    }

    pub fn format(&self) -> Format {
        self.format.unwrap_or_else(|| Format::infer(&self.location))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sources {
    pub ckd: SourceSpec,
    pub crosswalk: SourceSpec,
    pub unemployment: SourceSpec,
    pub atlas: SourceSpec,
}

impl Sources {
    pub fn get(&self, dataset: Dataset) -> &SourceSpec {
        match dataset {
            Dataset::Ckd => &self.ckd,
            Dataset::Crosswalk => &self.crosswalk,
            Dataset::Unemployment => &self.unemployment,
            Dataset::Atlas => &self.atlas,
        }
    }

    fn get_mut(&mut self, dataset: Dataset) -> &mut SourceSpec {
        match dataset {
            Dataset::Ckd => &mut self.ckd,
            Dataset::Crosswalk => &mut self.crosswalk,
            Dataset::Unemployment => &mut self.unemployment,
            Dataset::Atlas => &mut self.atlas,
        }
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            ckd: SourceSpec::new(DEFAULT_CKD_URL).with_headers(&DEFAULT_CKD_HEADERS),
            crosswalk: SourceSpec::new(DEFAULT_CROSSWALK_URL),
            unemployment: SourceSpec::new(DEFAULT_UNEMPLOYMENT_URL),
            atlas: SourceSpec::new(DEFAULT_ATLAS_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: Sources,
    /// Per-request timeout for remote fetches.
    pub timeout_secs: u64,
    /// Projection uses historical rows with `year > lookback_after`.
    pub lookback_after: i32,
    /// Optional parquet snapshot of the canonical table.
    pub cache_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Sources::default(),
            timeout_secs: 30,
            lookback_after: 2015,
            cache_path: None,
        }
    }
}

impl Config {
    /// Read `path` (YAML) if given, then apply `CKDSCOPE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (key, dataset) in [
            ("CKDSCOPE_CKD_URL", Dataset::Ckd),
            ("CKDSCOPE_CROSSWALK_URL", Dataset::Crosswalk),
            ("CKDSCOPE_UNEMPLOYMENT_URL", Dataset::Unemployment),
            ("CKDSCOPE_ATLAS_URL", Dataset::Atlas),
        ] {
            if let Some(loc) = lookup(key) {
                debug!(key, location = %loc, "source override");
                // a different file; the default header override no longer applies
                let spec = self.sources.get_mut(dataset);
                spec.location = loc;
                spec.headers = None;
            }
        }
        if let Some(p) = lookup("CKDSCOPE_CACHE_PATH") {
            self.cache_path = Some(PathBuf::from(p));
        }
        if let Some(v) = lookup("CKDSCOPE_TIMEOUT_SECS") {
            self.timeout_secs = v
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("CKDSCOPE_TIMEOUT_SECS={:?}", v)))?;
        }
        if let Some(v) = lookup("CKDSCOPE_LOOKBACK_AFTER") {
            self.lookback_after = v
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("CKDSCOPE_LOOKBACK_AFTER={:?}", v)))?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
