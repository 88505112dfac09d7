//! # Source Pipeline
//!
//! Layered data access for the playback engine and the prefetcher:
//!
//! ```text
//! ┌────────────────────────────┐
//! │   CacheDataSource          │  serves cached spans, backfills holes
//! └────────────┬───────────────┘
//!              │ miss
//!              ▼
//! ┌────────────────────────────┐
//! │   HttpDataSource           │  ranged GET, user agent, default headers
//! └────────────┬───────────────┘
//!              ▼
//!        dyn HttpClient          connect/read timeouts, redirects
//! ```
//!
//! [`SourcePipeline::build_caching_source`] composes the two layers over the
//! shared [`CacheStore`]. Each call produces an independent factory, so a
//! session and a prefetch task never share source state, only cache entries.

mod caching;
mod http;

pub use caching::{CacheDataSource, CacheDataSourceFactory, CacheFlags, SourceStats};
pub use http::{HttpDataSource, HttpDataSourceFactory};

use async_trait::async_trait;
use bridge_traits::HttpClient;
use bytes::Bytes;
use core_runtime::config::PlayerConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

use crate::cache::CacheStore;
use crate::error::Result;
use crate::key::stable_key;

// ============================================================================
// Data Spec & Traits
// ============================================================================

/// Region of a resource to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSpec {
    pub uri: String,
    pub position: u64,
    /// `None` reads to the end of the resource.
    pub length: Option<u64>,
    /// Cache key; defaults to the stable key of `uri`.
    pub key: Option<String>,
}

impl DataSpec {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            position: 0,
            length: None,
            key: None,
        }
    }

    pub fn with_position(mut self, position: u64) -> Self {
        self.position = position;
        self
    }

    pub fn with_length(mut self, length: Option<u64>) -> Self {
        self.length = length;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Key under which this region is cached.
    pub fn cache_key(&self) -> String {
        self.key.clone().unwrap_or_else(|| stable_key(&self.uri))
    }
}

/// Sequential reader over one [`DataSpec`] at a time.
#[async_trait]
pub trait DataSource: Send {
    /// Open `spec`, returning the number of readable bytes when known.
    async fn open(&mut self, spec: &DataSpec) -> Result<Option<u64>>;

    /// Next chunk, or `None` at the end of the spec.
    async fn read(&mut self) -> Result<Option<Bytes>>;

    async fn close(&mut self) -> Result<()>;

    /// Total length of the underlying resource once known.
    fn resource_length(&self) -> Option<u64> {
        None
    }
}

/// Creates fresh [`DataSource`]s; handed to the playback engine.
pub trait DataSourceFactory: Send + Sync {
    fn create_data_source(&self) -> Box<dyn DataSource>;
}

// ============================================================================
// SourcePipeline
// ============================================================================

/// Builds caching source factories bound to the shared cache.
#[derive(Clone)]
pub struct SourcePipeline {
    store: CacheStore,
    http_client: Arc<dyn HttpClient>,
    default_user_agent: String,
    flags: CacheFlags,
}

impl SourcePipeline {
    pub fn new(
        store: CacheStore,
        http_client: Arc<dyn HttpClient>,
        default_user_agent: impl Into<String>,
    ) -> Self {
        Self {
            store,
            http_client,
            default_user_agent: default_user_agent.into(),
            flags: CacheFlags::default(),
        }
    }

    pub fn from_config(config: &PlayerConfig, store: CacheStore) -> Self {
        Self::new(
            store,
            Arc::clone(&config.http_client),
            config.default_user_agent.clone(),
        )
    }

    pub fn with_flags(mut self, flags: CacheFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn default_user_agent(&self) -> &str {
        &self.default_user_agent
    }

    /// Compose `HttpDataSourceFactory` -> `CacheDataSourceFactory`.
    ///
    /// An empty or missing `user_agent` falls back to the default one.
    ///
    /// # Errors
    ///
    /// Fails only when the cache cannot be opened; there is no uncached
    /// fallback at this layer.
    #[instrument(skip(self, headers), fields(headers = headers.len()))]
    pub async fn build_caching_source(
        &self,
        user_agent: Option<&str>,
        headers: &HashMap<String, String>,
    ) -> Result<Arc<CacheDataSourceFactory>> {
        let cache = self.store.acquire().await?;

        let user_agent = user_agent
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(self.default_user_agent.as_str());

        let upstream = HttpDataSourceFactory::new(Arc::clone(&self.http_client), user_agent)
            .with_default_headers(headers.clone());

        Ok(Arc::new(CacheDataSourceFactory::new(
            cache,
            Arc::new(upstream),
            self.flags,
        )))
    }
}

impl fmt::Debug for SourcePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePipeline")
            .field("store", &self.store)
            .field("default_user_agent", &self.default_user_agent)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
