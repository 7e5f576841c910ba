use anyhow::{Context, Result};
use ckdscope::{
    analysis, snapshot, Config, Fips, Metric, Pipeline, ProjectionWeights, YearFilter,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::{collections::BTreeSet, io, path::PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ckdscope", version, about = "County CKD prevalence tables and projections")]
struct Cli {
    /// YAML configuration file; CKDSCOPE_* variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ignore the cached snapshot and fetch every source again.
    #[arg(long, global = true)]
    refresh: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Copy)]
struct WeightArgs {
    #[arg(long, default_value_t = 0.0)]
    senior: f64,
    #[arg(long, default_value_t = 0.0)]
    low_income: f64,
    #[arg(long, default_value_t = 0.0)]
    snap: f64,
}

impl WeightArgs {
    fn weights(&self) -> Result<ProjectionWeights> {
        ProjectionWeights::new(self.senior, self.low_income, self.snap).context("projection weights")
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the load cycle and print a summary.
    Load {
        /// Also write the canonical table to this parquet file.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Print canonical records as JSON.
    Table {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Project every county to a future year.
    Project {
        #[arg(long)]
        year: i32,
        #[command(flatten)]
        weights: WeightArgs,
    },
    /// National means with their trend line.
    Trend {
        /// Append a projection for this year before computing the trend.
        #[arg(long)]
        project_year: Option<i32>,
        #[command(flatten)]
        weights: WeightArgs,
    },
    /// Correlation of every metric with the CKD rate.
    Correlate {
        #[arg(long)]
        year: Option<i32>,
    },
    /// One metric per county, with the 10-mile proximity columns weighted.
    Metric {
        #[arg(long)]
        name: String,
        #[arg(long)]
        year: Option<i32>,
        /// Restrict to one county; `00000` means all counties.
        #[arg(long)]
        fips: Option<String>,
        #[command(flatten)]
        weights: WeightArgs,
    },
}

#[derive(Serialize)]
struct LoadSummary {
    rows: usize,
    counties: usize,
    years: Vec<i32>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    serde_json::to_writer_pretty(io::stdout().lock(), value).context("writing JSON to stdout")?;
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let pipeline = Pipeline::load(config, cli.refresh)
        .await
        .context("load cycle failed")?;
    let table = pipeline.table();

    match cli.command {
        Command::Load { snapshot: path } => {
            if let Some(path) = path {
                snapshot::write(table, &path)
                    .with_context(|| format!("writing snapshot {}", path.display()))?;
            }
            let counties: BTreeSet<&Fips> = table.all().iter().map(|r| &r.fips).collect();
            print_json(&LoadSummary {
                rows: table.len(),
                counties: counties.len(),
                years: table.years(),
            })?;
        }
        Command::Table { year } => {
            print_json(&pipeline.records(YearFilter::from(year)))?;
        }
        Command::Project { year, weights } => {
            let projection = pipeline.project(year, weights.weights()?)?;
            info!(omitted = projection.omitted.len(), "projection ready");
            print_json(&projection)?;
        }
        Command::Trend {
            project_year,
            weights,
        } => {
            let projected = match project_year {
                Some(y) => Some((y, weights.weights()?)),
                None => None,
            };
            print_json(&pipeline.trend(projected)?)?;
        }
        Command::Correlate { year } => {
            print_json(&pipeline.correlate(year)?)?;
        }
        Command::Metric {
            name,
            year,
            fips,
            weights,
        } => {
            let metric: Metric = name.parse()?;
            let year = year
                .or_else(|| table.latest_year())
                .context("canonical table is empty")?;
            let fips = match fips.as_deref().map(str::trim) {
                None | Some("00000") => None,
                Some(raw) => {
                    Some(Fips::parse(raw).with_context(|| format!("invalid FIPS {:?}", raw))?)
                }
            };
            let view =
                analysis::weighted_metric_view(table, year, metric, &weights.weights()?, fips.as_ref());
            print_json(&view)?;
        }
    }
    Ok(())
}
