// =============================================================================
// fetch_cache.rs — THE HOARDER
// =============================================================================
//
// A 10-K is a few megabytes of HTML. Ten years of filings for thirty
// companies is a few thousand of them. Fetching that twice because we
// tweaked a regex would be rude to the SEC and ruinous to our patience.
//
// So every document we ever fetch lands on disk, keyed by the MD5 of its
// URL (not its content; we have not fetched the content yet when we need
// the key). A cache hit costs one file read. A miss costs one network
// fetch, retried a small fixed number of times, then we give up on that
// filing and let the rest of the run carry on.
//
// There is no eviction and no expiry. Filings do not change after they are
// filed, and disk is cheaper than the SEC's goodwill.
//
// Writes go to a uniquely named temp file and are renamed into place, so
// two workers racing on the same URL each publish a complete file and the
// last rename wins.
// =============================================================================

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::FetchError;
use crate::metrics::RunMetrics;

/// Anything that can turn a document URL into its raw text.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// The real thing: reqwest against the SEC document host.
pub struct HttpDocumentSource {
    client: reqwest::Client,
}

impl HttpDocumentSource {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("*/*"),
        );

        // gzip/deflate/brotli features make reqwest advertise and decode
        // compressed responses on its own.
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

/// What a cache lookup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served from disk.
    Cached(String),
    /// Fetched from the network (and written to disk, if the disk agreed).
    Fetched(String),
    /// Every attempt failed. The caller should skip this document.
    Unavailable,
}

impl FetchOutcome {
    pub fn into_text(self) -> Option<String> {
        match self {
            FetchOutcome::Cached(text) | FetchOutcome::Fetched(text) => Some(text),
            FetchOutcome::Unavailable => None,
        }
    }
}

/// Read-through, write-behind, never-forget document cache.
pub struct FilingCache {
    dir: PathBuf,
    source: Arc<dyn DocumentSource>,
    timeout: Duration,
    max_attempts: u32,
    retry_pause: Duration,
    metrics: Arc<RunMetrics>,
}

impl FilingCache {
    pub fn new(config: &Config, source: Arc<dyn DocumentSource>, metrics: Arc<RunMetrics>) -> Self {
        Self {
            dir: config.cache_dir.clone(),
            source,
            timeout: config.fetch_timeout,
            max_attempts: config.fetch_max_attempts.max(1),
            retry_pause: config.fetch_retry_pause,
            metrics,
        }
    }

    /// Where the document for `url` lives (or will live) on disk.
    pub fn cache_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.html", cache_key(url)))
    }

    /// Return the document for `url`, from disk if we have it, otherwise
    /// from the network with bounded retries.
    pub async fn get(&self, url: &str) -> FetchOutcome {
        let path = self.cache_path(url);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                RunMetrics::incr(&self.metrics.cache_hits);
                debug!(url = url, path = %path.display(), "Cache hit");
                // Undecodable bytes get the replacement character rather
                // than costing us the whole filing.
                return FetchOutcome::Cached(String::from_utf8_lossy(&bytes).into_owned());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache entry, refetching");
            }
        }

        RunMetrics::incr(&self.metrics.cache_misses);

        for attempt in 1..=self.max_attempts {
            RunMetrics::incr(&self.metrics.fetch_attempts);

            let result = match tokio::time::timeout(self.timeout, self.source.fetch(url)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Other(format!(
                    "timed out after {}s",
                    self.timeout.as_secs_f32()
                ))),
            };

            match result {
                Ok(text) => {
                    self.store(&path, &text).await;
                    return FetchOutcome::Fetched(text);
                }
                Err(e) => {
                    warn!(
                        url = url,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Fetch attempt {}/{} failed",
                        attempt,
                        self.max_attempts
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_pause).await;
                    }
                }
            }
        }

        error!(
            url = url,
            attempts = self.max_attempts,
            "Giving up on filing document"
        );
        FetchOutcome::Unavailable
    }

    /// Persist a fetched document. Failure is logged and counted, never
    /// propagated: the caller already has the text in hand.
    async fn store(&self, path: &Path, text: &str) {
        if let Err(e) = write_atomically(path, text.as_bytes()).await {
            RunMetrics::incr(&self.metrics.cache_write_failures);
            warn!(path = %path.display(), error = %e, "Failed to write cache entry");
        }
    }
}

/// Deterministic cache key: hex MD5 of the URL.
pub fn cache_key(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "entry".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
