// src/lib.rs

pub mod analysis;
pub mod config;
pub mod error;
pub mod fetch;
pub mod join;
pub mod load;
pub mod normalize;
pub mod pipeline;
pub mod project;
pub mod record;
pub mod schema;
pub mod snapshot;
pub mod table;

pub use config::Config;
pub use error::{Error, Result};
pub use normalize::Fips;
pub use pipeline::Pipeline;
pub use project::{Projection, ProjectionWeights};
pub use record::{CountyRecord, Metric};
pub use table::{CanonicalTable, YearFilter};

#[cfg(test)]
pub(crate) fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ckdscope=debug")),
        )
        .with_test_writer()
        .finish();
    // another test may have installed it already
    let _ = tracing::subscriber::set_global_default(subscriber);
}
