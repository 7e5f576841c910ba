// src/fetch/mod.rs

use bytes::Bytes;
use reqwest::Client;
use std::{collections::BTreeMap, path::PathBuf, time::Duration};
use tokio::{fs, task, time::Instant};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::Sources;
use crate::error::{Error, Result};
use crate::schema::Dataset;

/// HTTP client with the per-request timeout applied.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ckdscope/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config(format!("building HTTP client: {}", e)))
}

enum Location {
    Remote(Url),
    Local(PathBuf),
}

fn classify(dataset: Dataset, location: &str) -> Result<Location> {
    match Url::parse(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Location::Remote(url)),
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(Location::Local)
            .map_err(|_| Error::unavailable(dataset.as_str(), location, "bad file URL")),
        _ => Ok(Location::Local(PathBuf::from(location))),
    }
}

/// Fetch one source's raw bytes. Remote failures (including timeouts and
/// non-success statuses) and unreadable local files are `SourceUnavailable`;
/// nothing is retried.
#[instrument(level = "info", skip(client), fields(dataset = %dataset))]
pub async fn fetch_source(client: &Client, dataset: Dataset, location: &str) -> Result<Bytes> {
    let start = Instant::now();
    let bytes = match classify(dataset, location)? {
        Location::Remote(url) => {
            let unavailable = |e: reqwest::Error| {
                let reason = if e.is_timeout() {
                    format!("timed out: {}", e)
                } else {
                    e.to_string()
                };
                Error::unavailable(dataset.as_str(), &url, reason)
            };
            client
                .get(url.clone())
                .send()
                .await
                .map_err(unavailable)?
                .error_for_status()
                .map_err(unavailable)?
                .bytes()
                .await
                .map_err(unavailable)?
        }
        Location::Local(path) => fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| Error::unavailable(dataset.as_str(), path.display(), e))?,
    };
    debug!(bytes = bytes.len(), elapsed = ?start.elapsed(), "fetched");
    Ok(bytes)
}

/// Fetch every source concurrently; they have no ordering dependency.
/// Returns as soon as any fetch fails, without waiting for the others.
pub async fn fetch_all(client: &Client, sources: &Sources) -> Result<BTreeMap<Dataset, Bytes>> {
    let fetches = Dataset::ALL.into_iter().map(|dataset| {
        let client = client.clone();
        let location = sources.get(dataset).location.clone();
        let handle = task::spawn(async move {
            let bytes = fetch_source(&client, dataset, &location).await?;
            Ok::<_, Error>((dataset, bytes))
        });
        async move {
            handle
                .await
                .map_err(|e| Error::Io(std::io::Error::other(e)))?
        }
    });

    let fetched = futures::future::try_join_all(fetches).await?;
    let mut out = BTreeMap::new();
    for (dataset, bytes) in fetched {
        info!(dataset = %dataset, bytes = bytes.len(), "source ready");
        out.insert(dataset, bytes);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceSpec;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[tokio::test]
    async fn local_path_and_file_url_are_read() -> anyhow::Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"fips,unemp\n01001,5.1\n")?;
        let client = build_client(Duration::from_secs(1))?;

        let path = tmp.path().to_string_lossy().to_string();
        let a = fetch_source(&client, Dataset::Unemployment, &path).await?;
        let url = Url::from_file_path(tmp.path()).unwrap().to_string();
        let b = fetch_source(&client, Dataset::Unemployment, &url).await?;
        assert_eq!(a, b);
        assert!(a.starts_with(b"fips,unemp"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_is_source_unavailable() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let client = build_client(Duration::from_secs(1))?;
        let missing = dir.path().join("nope.csv");
        let err = fetch_source(&client, Dataset::Atlas, &missing.to_string_lossy())
            .await
            .unwrap_err();
        match err {
            Error::SourceUnavailable { dataset, .. } => assert_eq!(dataset, "atlas"),
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn fetch_all_fails_when_any_source_is_missing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let present = dir.path().join("present.csv");
        std::fs::write(&present, "a\n1\n")?;
        let loc = present.to_string_lossy().to_string();
        let sources = Sources {
            ckd: SourceSpec::new(loc.clone()),
            crosswalk: SourceSpec::new(loc.clone()),
            unemployment: SourceSpec::new(dir.path().join("gone.csv").to_string_lossy()),
            atlas: SourceSpec::new(loc),
        };
        let client = build_client(Duration::from_secs(1))?;
        let err = fetch_all(&client, &sources).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn first_failure_does_not_wait_for_slow_sources() -> anyhow::Result<()> {
        // accepts connections but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let stalled = format!("http://{}/slow.csv", listener.local_addr()?);
        let dir = tempdir()?;
        let sources = Sources {
            ckd: SourceSpec::new(dir.path().join("missing.csv").to_string_lossy()),
            crosswalk: SourceSpec::new(stalled.clone()),
            unemployment: SourceSpec::new(stalled.clone()),
            atlas: SourceSpec::new(stalled),
        };
        let client = build_client(Duration::from_secs(10))?;

        let start = Instant::now();
        let err = fetch_all(&client, &sources).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(3), "{:?}", start.elapsed());
        match err {
            Error::SourceUnavailable { dataset, .. } => assert_eq!(dataset, "ckd"),
            other => panic!("unexpected {other:?}"),
        }
        drop(listener);
        Ok(())
    }
}
