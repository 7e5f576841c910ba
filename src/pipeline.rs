// src/pipeline.rs
//
// One load cycle: fetch every source, type it, join it, and hand back an
// immutable table. Optionally short-circuited by a parquet snapshot.

use std::collections::BTreeMap;
use tokio::task;
use tracing::{info, instrument};

use crate::analysis::{self, CorrelationTable};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{build_client, fetch_all};
use crate::join::build_canonical;
use crate::load::{self, LoadedSources};
use crate::project::trend::{trend_report, TrendReport};
use crate::project::{self, Projection, ProjectionWeights};
use crate::record::CountyRecord;
use crate::snapshot;
use crate::table::{CanonicalTable, YearFilter};

fn join_error(e: task::JoinError) -> Error {
    Error::Io(std::io::Error::other(e))
}

/// A loaded canonical table plus the configuration it was loaded with.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
    table: CanonicalTable,
}

impl Pipeline {
    /// Run the load cycle. With a `cache_path` configured, an existing
    /// snapshot is used unless `refresh` is set; a fresh load rewrites it.
    #[instrument(level = "info", skip(config), fields(cache = ?config.cache_path))]
    pub async fn load(config: Config, refresh: bool) -> Result<Self> {
        if let Some(path) = config.cache_path.clone() {
            if !refresh && path.exists() {
                let table = task::spawn_blocking(move || snapshot::read(&path))
                    .await
                    .map_err(join_error)??;
                info!(rows = table.len(), "canonical table loaded from snapshot");
                return Ok(Self { config, table });
            }
        }

        let table = load_from_sources(&config).await?;
        if let Some(path) = config.cache_path.clone() {
            let snap = table.clone();
            task::spawn_blocking(move || snapshot::write(&snap, &path))
                .await
                .map_err(join_error)??;
        }
        Ok(Self { config, table })
    }

    /// Wrap an already built table.
    pub fn from_table(config: Config, table: CanonicalTable) -> Self {
        Self { config, table }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn table(&self) -> &CanonicalTable {
        &self.table
    }

    pub fn records(&self, filter: YearFilter) -> Vec<&CountyRecord> {
        self.table.records(filter)
    }

    pub fn project(&self, target_year: i32, weights: ProjectionWeights) -> Result<Projection> {
        project::project(&self.table, self.config.lookback_after, target_year, weights)
    }

    /// National series, extended with a projection when `projected` is given.
    pub fn trend(&self, projected: Option<(i32, ProjectionWeights)>) -> Result<TrendReport> {
        let projection = projected
            .map(|(year, weights)| self.project(year, weights))
            .transpose()?;
        Ok(trend_report(&self.table, projection.as_ref()))
    }

    /// Correlations for `year`, defaulting to the latest loaded year.
    pub fn correlate(&self, year: Option<i32>) -> Result<CorrelationTable> {
        let year = year
            .or_else(|| self.table.latest_year())
            .ok_or(Error::EmptyTable("correlate"))?;
        Ok(analysis::correlate(&self.table, year))
    }
}

/// Fetch concurrently, then parse and join on the blocking pool.
pub async fn load_from_sources(config: &Config) -> Result<CanonicalTable> {
    let client = build_client(config.timeout())?;
    let fetched = fetch_all(&client, &config.sources).await?;
    let sources = config.sources.clone();

    task::spawn_blocking(move || {
        let mut tables = BTreeMap::new();
        for (dataset, bytes) in fetched {
            let format = sources.get(dataset).format();
            tables.insert(dataset, load::parse(dataset, format, bytes)?);
        }
        let loaded = LoadedSources::from_tables(tables, &sources)?;
        Ok(CanonicalTable::new(build_canonical(&loaded)?))
    })
    .await
    .map_err(join_error)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceSpec;
    use crate::normalize::Fips;
    use crate::schema::Dataset;
    use std::{fs, path::Path};
    use tempfile::tempdir;

    const CKD: &str = "State,County,Year,CkdRate\n\
        California,Los Angeles County,2018,18\n\
        California,Los Angeles County,2019,22\n\
        Ohio,Franklin,2019,10\n\
        Ohio,Delaware,2019,\n";

    const CROSSWALK: &str = "StateName\tStateAbbr\tCountyName\tCountyFIPS\n\
        California\tCA\tLos Angeles\t6037\n\
        Ohio\tOH\tFranklin\t39049\n";

    const UNEMPLOYMENT: &str = "fips,unemp\n06037,12\n39049,6\n";

    fn atlas() -> String {
        let header = Dataset::Atlas.expected_columns().join(",");
        let values = vec!["2"; 21].join(",");
        format!(
            "{header}\n\
             California,Los Angeles County,1000,{values}\n\
             California,Los Angeles County,1000,{values}\n\
             Ohio,Franklin County,500,{values}\n"
        )
    }

    fn fixture(dir: &Path) -> Config {
        let write = |name: &str, body: &str| {
            let p = dir.join(name);
            fs::write(&p, body).unwrap();
            SourceSpec::new(p.to_string_lossy())
        };
        let mut config = Config::default();
        config.sources.ckd = write("ckd.csv", CKD);
        config.sources.crosswalk = write("fips2county.tsv", CROSSWALK);
        config.sources.unemployment = write("unemp.csv", UNEMPLOYMENT);
        config.sources.atlas = write("atlas.csv", &atlas());
        config.cache_path = Some(dir.join("cache").join("canonical.parquet"));
        config
    }

    #[tokio::test]
    async fn load_join_project_from_local_files() -> anyhow::Result<()> {
        crate::init_test_logging();
        let dir = tempdir()?;
        let pipeline = Pipeline::load(fixture(dir.path()), true).await?;

        let t = pipeline.table();
        assert_eq!(t.len(), 3);
        let la = Fips::parse("06037").unwrap();
        let history = t.for_fips(&la);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].fips.as_str(), "06037");
        assert_eq!(history[0].state_abbr, "CA");
        assert_eq!(history[0].unemp_rate, 100.0);
        assert_eq!(pipeline.records(YearFilter::Year(2019)).len(), 2);

        let p = pipeline.project(2024, ProjectionWeights::default())?;
        assert!(p.records.iter().any(|r| r.fips.as_str() == "06037"));
        assert!(p.omitted.is_empty());

        let trend = pipeline.trend(Some((2024, ProjectionWeights::default())))?;
        assert_eq!(trend.actual.last().map(|p| p.year), Some(2024));
        Ok(())
    }

    #[tokio::test]
    async fn reload_is_idempotent_and_cache_honours_refresh() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let config = fixture(dir.path());

        let first = Pipeline::load(config.clone(), true).await?;
        let direct = load_from_sources(&config).await?;
        assert_eq!(first.table(), &direct);
        assert!(snapshot::read_meta(config.cache_path.as_ref().unwrap())?.is_some());

        // drop a county upstream; the snapshot still answers until refreshed
        fs::write(dir.path().join("ckd.csv"), CKD.replace("Ohio,Franklin,2019,10\n", ""))?;
        let cached = Pipeline::load(config.clone(), false).await?;
        assert_eq!(cached.table(), first.table());
        let refreshed = Pipeline::load(config, true).await?;
        assert_eq!(refreshed.table().len(), 2);
        Ok(())
    }

    #[test]
    fn correlating_an_empty_table_is_not_a_projection_error() {
        let pipeline = Pipeline::from_table(Config::default(), CanonicalTable::new(Vec::new()));
        assert!(matches!(
            pipeline.correlate(None).unwrap_err(),
            Error::EmptyTable("correlate")
        ));
        assert!(matches!(
            pipeline.correlate(Some(2019)),
            Ok(CorrelationTable { year: 2019, .. })
        ));
    }

    #[tokio::test]
    async fn renamed_upstream_column_is_reported() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut config = fixture(dir.path());
        config.cache_path = None;
        fs::write(dir.path().join("unemp.csv"), "fips,unemployment\n06037,12\n")?;

        match Pipeline::load(config, false).await.unwrap_err() {
            Error::SchemaMismatch { dataset, missing, .. } => {
                assert_eq!(dataset, "unemployment");
                assert_eq!(missing, vec!["unemp".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }
}
