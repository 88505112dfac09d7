//! Process-scoped handle to the segment cache.

use core_runtime::config::PlayerConfig;
use core_runtime::events::EventBus;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use crate::cache::config::CacheConfig;
use crate::cache::segment::SegmentCache;
use crate::error::{PlaybackError, Result};

/// Lazily opened, shared [`SegmentCache`].
///
/// Clones share one cache. The first [`acquire`](Self::acquire) opens the
/// directory; concurrent first callers wait on the same initialization and
/// all receive the same instance, so no two caches ever point at one
/// directory. Inject one store into both the playback and prefetch paths.
#[derive(Clone)]
pub struct CacheStore {
    config: Arc<CacheConfig>,
    cell: Arc<OnceCell<Arc<SegmentCache>>>,
    event_bus: Option<EventBus>,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config: Arc::new(config),
            cell: Arc::new(OnceCell::new()),
            event_bus: None,
        }
    }

    pub fn from_player_config(config: &PlayerConfig) -> Self {
        Self::new(CacheConfig::from(config))
    }

    /// Publish cache events; call before the first `acquire`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Return the cache, opening it on first use.
    ///
    /// # Errors
    ///
    /// Fails with [`PlaybackError::CacheUnavailable`](crate::PlaybackError::CacheUnavailable)
    /// when the directory is unwritable. A failed attempt is not memoized;
    /// the next call tries again.
    #[instrument(skip(self), fields(directory = %self.config.directory.display()))]
    pub async fn acquire(&self) -> Result<Arc<SegmentCache>> {
        let cache = self
            .cell
            .get_or_try_init(|| async {
                debug!("Opening segment cache");
                let config = (*self.config).clone();
                let event_bus = self.event_bus.clone();
                // Directory scan and index rewrite stay off the async workers.
                tokio::task::spawn_blocking(move || SegmentCache::open(config, event_bus))
                    .await
                    .map_err(|e| PlaybackError::Internal(format!("cache open task failed: {}", e)))?
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(cache))
    }

    /// The cache if it was already opened.
    pub fn get(&self) -> Option<Arc<SegmentCache>> {
        self.cell.get().cloned()
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("directory", &self.config.directory)
            .field("max_bytes", &self.config.max_bytes)
            .field("opened", &self.cell.initialized())
            .finish()
    }
}
