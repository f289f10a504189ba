//! Remote image fetching
//!
//! [`Transport`] performs exactly one GET; [`RemoteFetcher`] wraps it with
//! bounded retry, exponential backoff and rate-limit feedback. A failed
//! fetch never yields partial bytes.

use crate::cache::limiter::RateLimiter;
use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// No complete response within the timeout
    Timeout,
    /// HTTP 404/410, the image does not exist
    NotFound,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError(u16),
    /// Connection refused/reset, DNS failure, broken body stream
    Network,
    /// Other 4xx, empty or oversized body, unusable URL
    InvalidResponse,
}

impl FetchErrorKind {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::ServerError(_) | Self::Network
        )
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::NotFound => write!(f, "not found"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::ServerError(status) => write!(f, "server error {}", status),
            Self::Network => write!(f, "network error"),
            Self::InvalidResponse => write!(f, "invalid response"),
        }
    }
}

/// A failed fetch, after retries where applicable
#[derive(Error, Debug, Clone)]
#[error("{kind} fetching {url}: {detail}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub detail: String,
    /// Server-provided `Retry-After`, if any
    pub retry_after: Option<Duration>,
    /// Attempts made before giving up
    pub attempts: u32,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            detail: detail.into(),
            retry_after: None,
            attempts: 1,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    fn after_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// One GET against the remote image host
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the full body of `url`, or fail without returning bytes
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Map an HTTP status to a failure kind; `None` means success
pub fn classify_status(status: u16) -> Option<FetchErrorKind> {
    match status {
        200..=299 => None,
        404 | 410 => Some(FetchErrorKind::NotFound),
        429 => Some(FetchErrorKind::RateLimited),
        500..=599 => Some(FetchErrorKind::ServerError(status)),
        _ => Some(FetchErrorKind::InvalidResponse),
    }
}

/// Parse a `Retry-After` header given in seconds
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Blocking `ureq` transport, run on tokio's blocking pool
#[derive(Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    user_agent: String,
    max_body_bytes: u64,
}

impl HttpTransport {
    /// Create a transport with a hard per-request timeout
    pub fn new(timeout: Duration, user_agent: impl Into<String>, max_body_bytes: u64) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            user_agent: user_agent.into(),
            max_body_bytes,
        }
    }

    fn get_blocking(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", self.user_agent.as_str())
            .call()
            .map_err(|e| classify_transport_error(url, e))?;

        let status = response.status().as_u16();
        if let Some(kind) = classify_status(status) {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(
                FetchError::new(kind, url, format!("HTTP {}", status)).with_retry_after(retry_after)
            );
        }

        let body = response
            .body_mut()
            .with_config()
            .limit(self.max_body_bytes)
            .read_to_vec()
            .map_err(|e| classify_transport_error(url, e))?;

        if body.is_empty() {
            return Err(FetchError::new(
                FetchErrorKind::InvalidResponse,
                url,
                "empty response body",
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = self.clone();
        let owned_url = url.to_string();
        tokio::task::spawn_blocking(move || transport.get_blocking(&owned_url))
            .await
            .map_err(|e| FetchError::new(FetchErrorKind::Network, url, e.to_string()))?
    }
}

fn classify_transport_error(url: &str, err: ureq::Error) -> FetchError {
    let kind = match &err {
        ureq::Error::Timeout(_) => FetchErrorKind::Timeout,
        ureq::Error::Io(io) if io.kind() == ErrorKind::TimedOut => FetchErrorKind::Timeout,
        ureq::Error::StatusCode(status) => {
            classify_status(*status).unwrap_or(FetchErrorKind::InvalidResponse)
        }
        ureq::Error::BodyExceedsLimit(_) | ureq::Error::BadUri(_) => {
            FetchErrorKind::InvalidResponse
        }
        _ => FetchErrorKind::Network,
    };
    FetchError::new(kind, url, err.to_string())
}

/// Exponential backoff between fetch attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base: Duration,

    /// Maximum delay
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt.min(32) as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter = rand_jitter(delay * self.jitter.clamp(0.0, 1.0));
        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// Cheap jitter in `-range..=range` from the clock's low bits
fn rand_jitter(range: f64) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = seed.wrapping_mul(6364136223846793005).wrapping_add(1) as f64;
    let normalized = (random / u64::MAX as f64) * 2.0 - 1.0;
    normalized * range
}

/// Fetcher with retry, backoff and adaptive rate limiting.
///
/// The caller acquires the rate limiter before the first attempt; every
/// retry re-acquires it so retries share the global spacing.
pub struct RemoteFetcher {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RemoteFetcher {
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            limiter,
            policy,
        }
    }

    /// Fetch `url`, retrying transient failures
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempt: u32 = 0;

        loop {
            let err = match self.transport.get(url).await {
                Ok(bytes) => {
                    debug!(url = %url, bytes = bytes.len(), attempts = attempt + 1, "Fetched image");
                    return Ok(bytes);
                }
                Err(err) => err,
            };

            if err.kind == FetchErrorKind::RateLimited {
                self.limiter.widen(err.retry_after);
            }

            if !err.kind.is_retryable() {
                debug!(url = %url, kind = %err.kind, "Fetch failed permanently");
                return Err(err.after_attempts(attempt + 1));
            }

            if attempt >= self.policy.max_retries {
                warn!(url = %url, kind = %err.kind, attempts = attempt + 1, "Giving up on fetch");
                return Err(err.after_attempts(attempt + 1));
            }

            let server_hint = err.retry_after.unwrap_or_default().min(self.policy.max);
            let delay = self.policy.delay(attempt).max(server_hint);
            warn!(
                url = %url,
                kind = %err.kind,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Fetch failed, retrying"
            );

            tokio::time::sleep(delay).await;
            self.limiter.acquire().await;
            attempt += 1;
        }
    }
}
