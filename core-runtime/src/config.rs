//! # Player Configuration Module
//!
//! Provides configuration for the cached video player core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`PlayerConfig`] holding the cache location and budget, HTTP transport
//! settings, engine buffering profile and the injected HTTP client. It
//! enforces fail-fast validation so that a misconfigured cache is reported at
//! startup instead of on the first playback request.
//!
//! ## Required
//!
//! - `cache_root` - platform cache directory (e.g. `Context.cacheDir`)
//!
//! ## Optional (with platform defaults)
//!
//! - `HttpClient` - desktop default: reqwest, enabled by `desktop-shims`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::PlayerConfig;
//!
//! let config = PlayerConfig::builder()
//!     .cache_root("/data/user/0/app/cache")
//!     .default_user_agent("my-app/1.0")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, HttpSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default total cache budget: 1 GiB.
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 1024 * 1024 * 1024;

/// Default size of a head prefetch: 3 MiB.
pub const DEFAULT_PREFETCH_BYTES: u64 = 3 * 1024 * 1024;

/// Default user agent when the shell does not provide one.
pub const DEFAULT_USER_AGENT: &str = "cached-video-player/1.0";

/// Buffering profile handed to the playback engine.
///
/// The defaults favor fast start over smoothness: short clips in a feed should
/// begin after 300 ms of buffered media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub min_buffer: Duration,
    pub max_buffer: Duration,
    pub buffer_for_playback: Duration,
    pub buffer_for_playback_after_rebuffer: Duration,
    /// Fall back to another decoder when the preferred one fails to init.
    pub enable_decoder_fallback: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_buffer: Duration::from_millis(1500),
            max_buffer: Duration::from_millis(8000),
            buffer_for_playback: Duration::from_millis(300),
            buffer_for_playback_after_rebuffer: Duration::from_millis(500),
            enable_decoder_fallback: true,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.min_buffer > self.max_buffer {
            return Err(Error::Config(
                "min_buffer must not exceed max_buffer".to_string(),
            ));
        }
        if self.buffer_for_playback > self.min_buffer
            || self.buffer_for_playback_after_rebuffer > self.min_buffer
        {
            return Err(Error::Config(
                "playback start thresholds must not exceed min_buffer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the cached video player core.
///
/// Use [`PlayerConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct PlayerConfig {
    /// Platform cache directory; the video cache lives in a subdirectory.
    pub cache_root: PathBuf,

    /// Name of the dedicated cache subdirectory.
    pub cache_subdirectory: String,

    /// Total bytes the cache may occupy before LRU eviction.
    pub max_cache_bytes: u64,

    /// File name of the persisted cache index inside the cache directory.
    pub index_file_name: String,

    /// HTTP transport settings (timeouts, redirects).
    pub http: HttpSettings,

    /// User agent used when a request does not carry one.
    pub default_user_agent: String,

    /// Head prefetch size when the caller does not specify one.
    pub prefetch_default_bytes: u64,

    /// Engine buffering profile.
    pub engine: EngineSettings,

    /// HTTP client shared by playback and prefetch.
    pub http_client: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for PlayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerConfig")
            .field("cache_root", &self.cache_root)
            .field("cache_subdirectory", &self.cache_subdirectory)
            .field("max_cache_bytes", &self.max_cache_bytes)
            .field("index_file_name", &self.index_file_name)
            .field("http", &self.http)
            .field("default_user_agent", &self.default_user_agent)
            .field("prefetch_default_bytes", &self.prefetch_default_bytes)
            .field("engine", &self.engine)
            .field("http_client", &"HttpClient { ... }")
            .finish()
    }
}

impl PlayerConfig {
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Directory holding cache content and index.
    pub fn cache_directory(&self) -> PathBuf {
        self.cache_root.join(&self.cache_subdirectory)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Cache root and subdirectory are not empty
    /// - Cache budget and prefetch size are non-zero
    /// - Timeouts are non-zero
    /// - Engine buffering thresholds are ordered
    pub fn validate(&self) -> Result<()> {
        if self.cache_root.as_os_str().is_empty() {
            return Err(Error::Config("Cache root cannot be empty".to_string()));
        }

        if self.cache_subdirectory.is_empty() || self.index_file_name.is_empty() {
            return Err(Error::Config(
                "Cache subdirectory and index file name cannot be empty".to_string(),
            ));
        }

        if self.max_cache_bytes == 0 {
            return Err(Error::Config(
                "Cache size must be greater than 0 bytes".to_string(),
            ));
        }

        if self.prefetch_default_bytes == 0 {
            return Err(Error::Config(
                "Prefetch size must be greater than 0 bytes".to_string(),
            ));
        }

        if self.http.connect_timeout.is_zero() || self.http.read_timeout.is_zero() {
            return Err(Error::Config(
                "HTTP connect and read timeouts must be non-zero".to_string(),
            ));
        }

        self.engine.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_settings: &HttpSettings) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                  Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                  Mobile: inject the platform-native HTTP stack."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(settings: &HttpSettings) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(settings.clone())?);
    Ok(client)
}

/// Builder for constructing [`PlayerConfig`] instances.
#[derive(Default)]
pub struct PlayerConfigBuilder {
    cache_root: Option<PathBuf>,
    cache_subdirectory: Option<String>,
    max_cache_bytes: Option<u64>,
    index_file_name: Option<String>,
    http: Option<HttpSettings>,
    default_user_agent: Option<String>,
    prefetch_default_bytes: Option<u64>,
    engine: Option<EngineSettings>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl PlayerConfigBuilder {
    /// Sets the platform cache directory (required).
    pub fn cache_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_root = Some(path.into());
        self
    }

    /// Sets the cache subdirectory name. Default: `video_cache`.
    pub fn cache_subdirectory(mut self, name: impl Into<String>) -> Self {
        self.cache_subdirectory = Some(name.into());
        self
    }

    /// Sets the total cache budget in bytes. Default: 1 GiB.
    pub fn max_cache_bytes(mut self, bytes: u64) -> Self {
        self.max_cache_bytes = Some(bytes);
        self
    }

    pub fn index_file_name(mut self, name: impl Into<String>) -> Self {
        self.index_file_name = Some(name.into());
        self
    }

    /// Sets HTTP transport settings. Default: 8 s connect/read, cross-protocol
    /// redirects allowed.
    pub fn http_settings(mut self, settings: HttpSettings) -> Self {
        self.http = Some(settings);
        self
    }

    pub fn default_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.default_user_agent = Some(user_agent.into());
        self
    }

    /// Sets the head prefetch size in bytes. Default: 3 MiB.
    pub fn prefetch_default_bytes(mut self, bytes: u64) -> Self {
        self.prefetch_default_bytes = Some(bytes);
        self
    }

    pub fn engine_settings(mut self, settings: EngineSettings) -> Self {
        self.engine = Some(settings);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the final [`PlayerConfig`].
    ///
    /// # Errors
    ///
    /// - `Config` if `cache_root` is missing or a value fails validation
    /// - `CapabilityMissing` if no HTTP client is available
    pub fn build(self) -> Result<PlayerConfig> {
        let cache_root = self.cache_root.ok_or_else(|| {
            Error::Config(
                "Cache root is required. Pass the platform cache directory via cache_root()."
                    .to_string(),
            )
        })?;

        let http = self.http.unwrap_or_default();
        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&http)?,
        };

        let config = PlayerConfig {
            cache_root,
            cache_subdirectory: self
                .cache_subdirectory
                .unwrap_or_else(|| "video_cache".to_string()),
            max_cache_bytes: self.max_cache_bytes.unwrap_or(DEFAULT_MAX_CACHE_BYTES),
            index_file_name: self
                .index_file_name
                .unwrap_or_else(|| "cache_index.json".to_string()),
            http,
            default_user_agent: self
                .default_user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            prefetch_default_bytes: self
                .prefetch_default_bytes
                .unwrap_or(DEFAULT_PREFETCH_BYTES),
            engine: self.engine.unwrap_or_default(),
            http_client,
        };

        config.validate()?;
        Ok(config)
    }
}
