//! Cache-first image retrieval
//!
//! A request walks: check the disk store, and on a miss join (or start)
//! the single in-flight fetch for its key. The fetch waits its turn on the
//! rate limiter, downloads the image and stores it before any waiter sees
//! the bytes.

use crate::cache::coalesce::RequestCoalescer;
use crate::cache::fetch::RemoteFetcher;
use crate::cache::key::CacheKey;
use crate::cache::limiter::RateLimiter;
use crate::cache::store::{CacheInfo, DiskStore};
use crate::error::{ImageError, ImageResult};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where to find one image, and under which key to keep it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub key: CacheKey,
    pub url: String,
}

impl ImageSource {
    pub fn new(key: CacheKey, url: impl Into<String>) -> Self {
        Self {
            key,
            url: url.into(),
        }
    }
}

/// Result of prefetching one source
#[derive(Debug, Clone)]
pub enum PrefetchOutcome {
    /// Already on disk, nothing fetched
    Cached,
    /// Downloaded and stored
    Fetched,
    Failed(ImageError),
}

/// Tally of a prefetch run
#[derive(Debug, Default)]
pub struct PrefetchReport {
    pub cached: usize,
    pub fetched: usize,
    pub failed: Vec<(CacheKey, ImageError)>,
    /// Requests that never reached the cache, such as unknown card ids
    pub unresolved: Vec<ImageError>,
}

impl PrefetchReport {
    pub fn total(&self) -> usize {
        self.cached + self.fetched + self.failed.len() + self.unresolved.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.unresolved.is_empty()
    }

    fn record(&mut self, key: CacheKey, outcome: PrefetchOutcome) {
        match outcome {
            PrefetchOutcome::Cached => self.cached += 1,
            PrefetchOutcome::Fetched => self.fetched += 1,
            PrefetchOutcome::Failed(err) => self.failed.push((key, err)),
        }
    }
}

/// Disk cache in front of a rate-limited remote image host
pub struct ImageCache {
    store: Arc<DiskStore>,
    fetcher: Arc<RemoteFetcher>,
    limiter: Arc<RateLimiter>,
    coalescer: RequestCoalescer<CacheKey, Vec<u8>, ImageError>,
    auto_download: bool,
}

impl ImageCache {
    /// `limiter` must be the same limiter the fetcher widens on 429s
    pub fn new(store: DiskStore, fetcher: RemoteFetcher, limiter: Arc<RateLimiter>) -> Self {
        Self {
            store: Arc::new(store),
            fetcher: Arc::new(fetcher),
            limiter,
            coalescer: RequestCoalescer::new(),
            auto_download: true,
        }
    }

    /// When disabled, misses fail with [`ImageError::Disabled`] instead of
    /// reaching the network
    pub fn with_auto_download(mut self, enabled: bool) -> Self {
        self.auto_download = enabled;
        self
    }

    pub fn auto_download(&self) -> bool {
        self.auto_download
    }

    /// Return the image for `key`, downloading it from `url` on a miss.
    ///
    /// Concurrent callers for the same key share one download. A failed
    /// download stores nothing, so a later call may try again.
    pub async fn get(&self, key: &CacheKey, url: &str) -> ImageResult<Vec<u8>> {
        if let Some(bytes) = self.store.lookup(key).await {
            return Ok(bytes);
        }

        if !self.auto_download {
            debug!(key = %key, "Cache miss with downloads disabled");
            return Err(ImageError::Disabled);
        }

        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let limiter = Arc::clone(&self.limiter);
        let task_key = key.clone();
        let task_url = url.to_string();

        self.coalescer
            .run_exclusive(key.clone(), move || {
                fetch_and_store(store, fetcher, limiter, task_key, task_url)
            })
            .await
    }

    /// Return the image only if it is already on disk
    pub async fn get_cached(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.store.lookup(key).await
    }

    /// Whether `key` is on disk; does not refresh its access time
    pub async fn is_cached(&self, key: &CacheKey) -> bool {
        self.store.contains(key).await
    }

    pub async fn info(&self) -> CacheInfo {
        self.store.info().await
    }

    /// Delete every cached image; returns how many were removed
    pub async fn clear(&self) -> ImageResult<usize> {
        Ok(self.store.clear().await?)
    }

    /// Persist pending index updates
    pub async fn flush(&self) {
        self.store.flush().await;
    }

    /// Keys with a download currently running
    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }

    /// Warm the cache for `sources`, running up to `concurrency` requests
    /// at once. Outbound calls still respect the rate limiter.
    ///
    /// `on_done` is called once per source as it finishes.
    pub async fn prefetch<F>(
        &self,
        sources: Vec<ImageSource>,
        concurrency: usize,
        mut on_done: F,
    ) -> PrefetchReport
    where
        F: FnMut(&ImageSource, &PrefetchOutcome),
    {
        let mut report = PrefetchReport::default();
        let mut results = stream::iter(sources)
            .map(|source| async move {
                let outcome = self.prefetch_one(&source).await;
                (source, outcome)
            })
            .buffer_unordered(concurrency.max(1));

        while let Some((source, outcome)) = results.next().await {
            on_done(&source, &outcome);
            report.record(source.key, outcome);
        }

        info!(
            cached = report.cached,
            fetched = report.fetched,
            failed = report.failed.len(),
            "Prefetch finished"
        );
        report
    }

    async fn prefetch_one(&self, source: &ImageSource) -> PrefetchOutcome {
        if self.store.contains(&source.key).await {
            return PrefetchOutcome::Cached;
        }
        match self.get(&source.key, &source.url).await {
            Ok(_) => PrefetchOutcome::Fetched,
            Err(err) => PrefetchOutcome::Failed(err),
        }
    }
}

/// Body of one coalesced download
async fn fetch_and_store(
    store: Arc<DiskStore>,
    fetcher: Arc<RemoteFetcher>,
    limiter: Arc<RateLimiter>,
    key: CacheKey,
    url: String,
) -> ImageResult<Vec<u8>> {
    // A run that finished between our miss and this one may have stored it
    if let Some(bytes) = store.lookup(&key).await {
        return Ok(bytes);
    }

    limiter.acquire().await;

    let bytes = fetcher.fetch(&url).await.map_err(|err| {
        warn!(key = %key, url = %url, kind = %err.kind, attempts = err.attempts, "Image download failed");
        ImageError::from(err)
    })?;

    store.put(&key, &bytes).await?;
    Ok(bytes)
}
