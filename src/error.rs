//! Error types for cardcache
//!
//! Image lookups return `ImageResult<T>`; configuration, catalog and CLI
//! plumbing return `CardcacheResult<T>`.

use crate::cache::coalesce::TaskAborted;
use crate::cache::fetch::{FetchError, FetchErrorKind};
use crate::cache::store::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for image lookups
pub type ImageResult<T> = Result<T, ImageError>;

/// Result type alias for everything else
pub type CardcacheResult<T> = Result<T, CardcacheError>;

/// Outcome of a failed image request.
///
/// Cloneable so one coalesced failure can be handed to every waiter.
#[derive(Error, Debug, Clone)]
pub enum ImageError {
    #[error("Image download timed out")]
    Timeout,

    #[error("Image not found on the remote server")]
    NotFound,

    #[error("Remote server is rate limiting requests")]
    RateLimited,

    #[error("Remote server error (HTTP {status})")]
    ServerError { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Image is not cached and automatic download is disabled")]
    Disabled,

    #[error("Unknown card: {0}")]
    UnknownCard(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImageError {
    /// Whether asking again later has a chance of succeeding
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::ServerError { .. } | Self::Network(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Disabled => Some("Enable downloads with: cardcache config init, then set images.auto_download = true"),
            Self::RateLimited => Some("Increase api.rate_limit_delay in the config file"),
            Self::Timeout => Some("Increase api.timeout_seconds or check your connection"),
            Self::Network(_) => Some("Check your network connection"),
            Self::Storage(_) => Some("Check free space and permissions of images.cache_dir"),
            Self::UnknownCard(_) => Some("Check the card id against the catalog file"),
            _ => None,
        }
    }
}

impl From<FetchError> for ImageError {
    fn from(err: FetchError) -> Self {
        match err.kind {
            FetchErrorKind::Timeout => Self::Timeout,
            FetchErrorKind::NotFound => Self::NotFound,
            FetchErrorKind::RateLimited => Self::RateLimited,
            FetchErrorKind::ServerError(status) => Self::ServerError { status },
            FetchErrorKind::Network => Self::Network(format!("{}: {}", err.url, err.detail)),
            FetchErrorKind::InvalidResponse => {
                Self::InvalidResponse(format!("{}: {}", err.url, err.detail))
            }
        }
    }
}

impl From<TaskAborted> for ImageError {
    fn from(err: TaskAborted) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Errors from configuration, catalog loading and the CLI
#[derive(Error, Debug)]
pub enum CardcacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Catalog errors
    #[error("Card catalog not found: {0}")]
    CatalogNotFound(PathBuf),

    #[error("Invalid card catalog at {path}: {reason}")]
    CatalogInvalid { path: PathBuf, reason: String },

    // Image errors
    #[error(transparent)]
    Image(#[from] ImageError),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),
}

impl CardcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Image(e) => e.hint(),
            Self::CatalogNotFound(_) => Some("Set catalog.path in the config file or pass --catalog"),
            Self::ConfigInvalid { .. } => Some("Run: cardcache config init --force"),
            _ => None,
        }
    }
}
