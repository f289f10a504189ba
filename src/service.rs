//! Card-level image service
//!
//! Entry point for callers that know card ids rather than cache keys.
//! Resolves ids through the [`CardCatalog`] and delegates to the
//! [`ImageCache`].

use crate::cache::store::DEFAULT_TMP_GRACE;
use crate::cache::{
    CacheInfo, DiskStore, HttpTransport, ImageCache, ImageSource, PrefetchOutcome,
    PrefetchReport, RateLimiter, RemoteFetcher,
};
use crate::catalog::CardCatalog;
use crate::config::{Config, ConfigManager, ImageQuality};
use crate::error::{CardcacheError, CardcacheResult, ImageError, ImageResult};
use std::sync::Arc;
use tracing::debug;

/// Build the image cache described by `config`
pub async fn open_cache(config: &Config) -> CardcacheResult<ImageCache> {
    let cache_dir = ConfigManager::cache_dir(config);
    // A temp file younger than a whole fetch may belong to another process
    let store = DiskStore::open_with_tmp_grace(
        &cache_dir,
        config.cache_size_budget_bytes(),
        config.images.eviction_policy,
        config.timeout().max(DEFAULT_TMP_GRACE),
    )
    .await
    .map_err(|e| CardcacheError::io(format!("opening image cache {}", cache_dir.display()), e))?;

    let limiter = Arc::new(RateLimiter::with_ceiling(
        config.rate_limit_interval(),
        config.max_rate_limit_interval(),
    ));
    let transport = HttpTransport::new(
        config.timeout(),
        config.api.user_agent.clone(),
        config.max_image_bytes(),
    );
    let fetcher = RemoteFetcher::new(
        Arc::new(transport),
        Arc::clone(&limiter),
        config.retry_policy(),
    );

    debug!(
        root = %cache_dir.display(),
        budget = config.cache_size_budget_bytes(),
        interval_ms = config.rate_limit_interval().as_millis() as u64,
        "Image cache ready"
    );

    Ok(ImageCache::new(store, fetcher, limiter).with_auto_download(config.images.auto_download))
}

/// Statistics for the configured cache, read without modifying it
pub async fn inspect_cache(config: &Config) -> CardcacheResult<CacheInfo> {
    let cache_dir = ConfigManager::cache_dir(config);
    DiskStore::inspect(&cache_dir, config.cache_size_budget_bytes())
        .await
        .map_err(|e| CardcacheError::io(format!("reading image cache {}", cache_dir.display()), e))
}

/// Card ids split into fetchable sources and ids that cannot be fetched
#[derive(Debug)]
pub struct Resolved<'a> {
    pub sources: Vec<(&'a str, ImageSource)>,
    pub unresolved: Vec<(&'a str, ImageError)>,
}

/// Card images by card id
pub struct ImageService {
    catalog: CardCatalog,
    cache: ImageCache,
    quality: ImageQuality,
    prefetch_concurrency: usize,
}

impl ImageService {
    pub fn new(catalog: CardCatalog, cache: ImageCache, quality: ImageQuality) -> Self {
        Self {
            catalog,
            cache,
            quality,
            prefetch_concurrency: 4,
        }
    }

    /// Load the catalog and open the cache described by `config`
    pub async fn from_config(config: &Config) -> CardcacheResult<Self> {
        let catalog = CardCatalog::load(&ConfigManager::catalog_path(config)).await?;
        let cache = open_cache(config).await?;
        Ok(Self::new(catalog, cache, config.images.image_quality)
            .with_prefetch_concurrency(config.images.prefetch_concurrency))
    }

    pub fn with_prefetch_concurrency(mut self, concurrency: usize) -> Self {
        self.prefetch_concurrency = concurrency.max(1);
        self
    }

    pub fn catalog(&self) -> &CardCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    /// Where the image for `card_id` lives, or why it cannot be found
    pub fn source(&self, card_id: &str) -> ImageResult<ImageSource> {
        match self.catalog.resolve(card_id, self.quality) {
            Some(source) => Ok(source),
            None if self.catalog.get(card_id).is_some() => Err(ImageError::NotFound),
            None => Err(ImageError::UnknownCard(card_id.to_string())),
        }
    }

    /// Resolve every id in `card_ids`, keeping their order
    pub fn resolve<'a>(&self, card_ids: &'a [String]) -> Resolved<'a> {
        let mut resolved = Resolved {
            sources: Vec::with_capacity(card_ids.len()),
            unresolved: Vec::new(),
        };
        for id in card_ids {
            match self.source(id) {
                Ok(source) => resolved.sources.push((id.as_str(), source)),
                Err(err) => resolved.unresolved.push((id.as_str(), err)),
            }
        }
        resolved
    }

    /// Image bytes for `card_id`, downloading on a miss when allowed
    pub async fn get_image(&self, card_id: &str) -> ImageResult<Vec<u8>> {
        let source = self.source(card_id)?;
        self.cache.get(&source.key, &source.url).await
    }

    pub async fn get_cache_info(&self) -> CacheInfo {
        self.cache.info().await
    }

    /// Delete every cached image; returns how many were removed
    pub async fn clear_cache(&self) -> ImageResult<usize> {
        self.cache.clear().await
    }

    pub async fn is_image_cached(&self, card_id: &str) -> bool {
        match self.catalog.resolve(card_id, self.quality) {
            Some(source) => self.cache.is_cached(&source.key).await,
            None => false,
        }
    }

    /// Warm the cache for `card_ids`. Ids that do not resolve are reported
    /// as failures without touching the network, and `on_done` is called
    /// once per id that did resolve.
    pub async fn preload<F>(&self, card_ids: &[String], on_done: F) -> PrefetchReport
    where
        F: FnMut(&ImageSource, &PrefetchOutcome),
    {
        let resolved = self.resolve(card_ids);
        let sources = resolved.sources.into_iter().map(|(_, s)| s).collect();

        let mut report = self
            .cache
            .prefetch(sources, self.prefetch_concurrency, on_done)
            .await;
        report.unresolved = resolved.unresolved.into_iter().map(|(_, e)| e).collect();
        report
    }

    /// Persist pending cache index updates
    pub async fn flush(&self) {
        self.cache.flush().await;
    }
}
