use std::future::Future;
use std::path::Path;
use std::time::Duration;

use rand::Rng as _;
use tokio::io::AsyncWriteExt as _;
use url::Url;

use crate::error::{Error, Result};
use crate::store;

/// Politeness pause applied after every remote fetch: a fixed base wait plus
/// a uniformly random extra in `[0, jitter)`.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    base: Duration,
    jitter: Duration,
}

impl Throttle {
    pub fn new(base_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            jitter: Duration::from_millis(jitter_ms),
        }
    }

    pub async fn pause(&self) {
        tokio::time::sleep(self.delay()).await;
    }

    fn delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.base;
        }
        let extra_ms = rand::thread_rng().gen_range(0..self.jitter.as_millis() as u64);
        self.base + Duration::from_millis(extra_ms)
    }
}

pub fn client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("questshelf/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Return the durable blob at `path` if one exists, with no freshness check.
/// Otherwise await `fetch`, persist the fully parsed payload, pause for
/// politeness, and return it. A network or parse failure writes nothing.
pub async fn get_or_fetch<F, Fut>(
    path: &Path,
    throttle: &Throttle,
    fetch: F,
) -> Result<serde_json::Value>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<serde_json::Value>>,
{
    if path.exists() {
        return store::read_json(path);
    }

    let payload = fetch().await?;
    store::write_json(path, &payload)?;
    throttle.pause().await;
    Ok(payload)
}

pub async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<serde_json::Value> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json().await?)
}

/// Stream a remote resource to durable storage. A failed download leaves no
/// partial file behind.
pub async fn download_to(client: &reqwest::Client, url: &Url, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        store::ensure_dir(parent)?;
    }

    match stream_to_file(client, url, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = std::fs::remove_file(path);
            Err(err)
        }
    }
}

async fn stream_to_file(client: &reqwest::Client, url: &Url, path: &Path) -> Result<()> {
    let mut response = client.get(url.clone()).send().await?.error_for_status()?;

    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|err| Error::storage(path, err))?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(|err| Error::storage(path, err))?;
    }
    file.flush().await.map_err(|err| Error::storage(path, err))?;

    Ok(())
}
