//! Local image cache with coalesced, rate-limited remote fetching
//!
//! Images are stored on disk under a byte budget and looked up by
//! [`CacheKey`]. On a miss, one download per key runs at a time, spaced
//! by a global [`RateLimiter`], and is stored before anyone sees it.
//!
//! # Request Flow
//!
//! | Step | Component | On failure |
//! |------|-----------|------------|
//! | Check disk | [`DiskStore`] | treated as miss |
//! | Join or start download | [`RequestCoalescer`] | shared by all waiters |
//! | Wait for turn | [`RateLimiter`] | never fails |
//! | Download | [`RemoteFetcher`] | nothing stored |
//! | Store, evict | [`DiskStore`] | storage error |

pub mod coalesce;
pub mod fetch;
pub mod image_cache;
pub mod key;
pub mod limiter;
pub mod store;

pub use coalesce::{RequestCoalescer, TaskAborted};
pub use fetch::{FetchError, FetchErrorKind, HttpTransport, RemoteFetcher, RetryPolicy, Transport};
pub use image_cache::{ImageCache, ImageSource, PrefetchOutcome, PrefetchReport};
pub use key::{CacheKey, InvalidKey};
pub use limiter::RateLimiter;
pub use store::{CacheEntry, CacheInfo, DiskStore, EvictionPolicy, StorageError};
