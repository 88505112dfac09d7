//! # Playback Error Types
//!
//! Error types for the video cache, data sources, sessions and prefetch.

use bridge_traits::BridgeError;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur in the playback core.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// The cache directory could not be created, written or indexed.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Configuration rejected at construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Source Errors
    // ========================================================================
    /// Failed to open or read a data source.
    #[error("Data source error: {0}")]
    SourceError(String),

    /// Upstream answered with a status the source cannot serve.
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    /// No body bytes arrived within the read timeout.
    #[error("Read timed out: {0}")]
    ReadTimeout(String),

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// Reading or writing cached spans failed.
    #[error("Cache error: {0}")]
    CacheError(String),

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Command issued to a released session that needs an engine.
    #[error("Playback session released")]
    SessionReleased,

    /// The playback engine rejected an operation.
    #[error("Engine error: {0}")]
    Engine(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge error: {0}")]
    Bridge(BridgeError),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::ReadTimeout(_) => true,
            PlaybackError::Http { status, .. } => *status >= 500 || *status == 429,
            PlaybackError::Bridge(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if the error came from the cache layer rather than the
    /// network, i.e. an upstream fetch could still succeed.
    pub fn is_cache_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::CacheError(_) | PlaybackError::CacheUnavailable(_) | PlaybackError::Io(_)
        )
    }
}

impl From<BridgeError> for PlaybackError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(msg) => PlaybackError::ReadTimeout(msg),
            BridgeError::Http { status, url } => PlaybackError::Http { status, url },
            other => PlaybackError::Bridge(other),
        }
    }
}

impl From<core_runtime::Error> for PlaybackError {
    fn from(err: core_runtime::Error) -> Self {
        match err {
            core_runtime::Error::Bridge(e) => e.into(),
            other => PlaybackError::InvalidConfig(other.to_string()),
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Run a teardown step, logging and discarding any error.
///
/// Teardown must never block releasing a resource, so failures here are only
/// visible at `debug` level.
pub fn best_effort<F>(label: &str, f: F)
where
    F: FnOnce() -> Result<()>,
{
    if let Err(err) = f() {
        debug!(step = label, error = %err, "Ignoring teardown failure");
    }
}
