//! Cardcache - local card image cache
//!
//! Turns a card id into image bytes, serving from a size-bounded disk
//! cache and falling back to a rate-limited remote image host. Concurrent
//! requests for the same image share one download.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod service;
pub mod ui;

pub use error::{CardcacheError, CardcacheResult, ImageError, ImageResult};
pub use service::ImageService;
