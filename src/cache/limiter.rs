//! Global spacing of outbound image API calls
//!
//! Callers queue on a fair mutex, so they are released strictly in
//! arrival order. The interval only ever grows at runtime: a rate-limited
//! response widens it, nothing narrows it again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Default ceiling for adaptive widening
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Smallest interval a widened limiter will use, even if it started at zero
const MIN_WIDENED_INTERVAL: Duration = Duration::from_millis(50);

/// Process-wide spacing state, touched only under the limiter's lock
#[derive(Debug, Default)]
struct RateBudget {
    /// When the previous caller was released
    last_call: Option<Instant>,
}

/// FIFO rate limiter enforcing a minimum interval between remote calls
#[derive(Debug)]
pub struct RateLimiter {
    budget: Mutex<RateBudget>,
    /// Current minimum interval in microseconds
    interval_us: AtomicU64,
    max_interval: Duration,
}

impl RateLimiter {
    /// Create a limiter with the default widening ceiling
    pub fn new(min_interval: Duration) -> Self {
        Self::with_ceiling(min_interval, DEFAULT_MAX_INTERVAL)
    }

    /// Create a limiter whose adaptive widening stops at `max_interval`
    pub fn with_ceiling(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            budget: Mutex::new(RateBudget::default()),
            interval_us: AtomicU64::new(as_micros(min_interval)),
            max_interval: max_interval.max(min_interval),
        }
    }

    /// Current minimum interval between calls
    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us.load(Ordering::Acquire))
    }

    /// Wait for the caller's turn.
    ///
    /// Returns once at least one interval has passed since the previous
    /// caller was released. Never fails, only delays.
    pub async fn acquire(&self) {
        let mut budget = self.budget.lock().await;

        if let Some(last) = budget.last_call {
            let ready_at = last + self.interval();
            let now = Instant::now();
            if ready_at > now {
                debug!(wait_ms = (ready_at - now).as_millis() as u64, "Rate limit wait");
                sleep_until(ready_at).await;
            }
        }

        budget.last_call = Some(Instant::now());
    }

    /// Widen the interval after the remote side pushed back.
    ///
    /// The new interval is at least double the current one and at least
    /// `hint` (a `Retry-After` value), capped at the ceiling. Returns the
    /// interval now in effect.
    pub fn widen(&self, hint: Option<Duration>) -> Duration {
        let ceiling = as_micros(self.max_interval);
        let floor = as_micros(MIN_WIDENED_INTERVAL);
        let hint = hint.map(as_micros).unwrap_or(0);

        let previous = self
            .interval_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.saturating_mul(2).max(floor).max(hint).min(ceiling);
                Some(next.max(current))
            })
            .unwrap_or_else(|current| current);

        let widened = self.interval();
        if widened > Duration::from_micros(previous) {
            info!(
                from_ms = previous / 1000,
                to_ms = widened.as_millis() as u64,
                "Widened rate limit interval"
            );
        }
        widened
    }
}

fn as_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
