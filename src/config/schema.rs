//! Configuration schema for cardcache
//!
//! Configuration is stored at `~/.config/cardcache/config.toml`

use crate::cache::{EvictionPolicy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Image cache settings
    pub images: ImagesConfig,

    /// Remote API settings
    pub api: ApiConfig,

    /// Card catalog settings
    pub catalog: CatalogConfig,
}

impl Config {
    /// Cache size budget in bytes
    pub fn cache_size_budget_bytes(&self) -> u64 {
        self.images.cache_size_mb.saturating_mul(1024 * 1024)
    }

    /// Largest single image body accepted, in bytes
    pub fn max_image_bytes(&self) -> u64 {
        self.images.max_image_mb.saturating_mul(1024 * 1024)
    }

    /// Minimum spacing between remote calls
    pub fn rate_limit_interval(&self) -> Duration {
        secs_f64(self.api.rate_limit_delay)
    }

    /// Ceiling for adaptive widening after rate-limited responses
    pub fn max_rate_limit_interval(&self) -> Duration {
        secs_f64(self.api.max_rate_limit_delay).max(self.rate_limit_interval())
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.api.max_retries,
            base: Duration::from_millis(self.api.backoff_base_ms),
            max: Duration::from_millis(self.api.backoff_max_ms.max(self.api.backoff_base_ms)),
            jitter: self.api.backoff_jitter.clamp(0.0, 1.0),
        }
    }
}

/// Negative and non-finite values become zero
fn secs_f64(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Which image size to request from the remote host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Low,
    #[default]
    Normal,
    High,
}

impl ImageQuality {
    /// Name of the remote image variant for this quality
    pub fn variant(&self) -> &'static str {
        match self {
            Self::Low => "small",
            Self::Normal => "normal",
            Self::High => "large",
        }
    }
}

/// Image cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Cache directory (default: platform cache dir)
    pub cache_dir: Option<PathBuf>,

    /// Cache size budget in MB
    pub cache_size_mb: u64,

    /// Download missing images automatically
    pub auto_download: bool,

    /// Image quality: "low", "normal" or "high"
    pub image_quality: ImageQuality,

    /// Eviction order when over budget: "lru" or "largest_first"
    pub eviction_policy: EvictionPolicy,

    /// Largest accepted image in MB
    pub max_image_mb: u64,

    /// Concurrent requests during prefetch
    pub prefetch_concurrency: usize,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_size_mb: 500,
            auto_download: true,
            image_quality: ImageQuality::Normal,
            eviction_policy: EvictionPolicy::Lru,
            max_image_mb: 16,
            prefetch_concurrency: 4,
        }
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Minimum seconds between requests
    pub rate_limit_delay: f64,

    /// Upper bound in seconds when backing off from rate limiting
    pub max_rate_limit_delay: f64,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// First backoff delay in milliseconds
    pub backoff_base_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub backoff_max_ms: u64,

    /// Backoff jitter factor (0.0 to 1.0)
    pub backoff_jitter: f64,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            rate_limit_delay: 0.1,
            max_rate_limit_delay: 10.0,
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
            backoff_jitter: 0.25,
            user_agent: format!("cardcache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Card catalog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON catalog file (default: platform data dir)
    pub path: Option<PathBuf>,
}
