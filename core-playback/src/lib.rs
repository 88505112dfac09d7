//! # Cached Playback Module
//!
//! Disk-cached video playback: cache, data sources, playback sessions and
//! head prefetch.
//!
//! ## Overview
//!
//! ```text
//!   PlaybackSession ──┐                  ┌── PrefetchController
//!                     ▼                  ▼
//!                 SourcePipeline::build_caching_source
//!                     │
//!          CacheDataSource ──miss──▶ HttpDataSource ──▶ dyn HttpClient
//!                     │
//!                     ▼
//!        CacheStore::acquire ──▶ SegmentCache (LRU, persisted index)
//! ```
//!
//! - [`key::stable_key`] strips query and fragment so rotating signed URLs
//!   share one cache entry
//! - [`CacheStore`] lazily opens the single cache instance for a directory
//! - [`PlaybackSession`] drives a host [`VideoEngine`] and binds it to at most
//!   one [`VideoSurface`]
//! - [`PrefetchController`] warms the cache in cancellable background tasks

pub mod cache;
pub mod error;
pub mod key;
pub mod prefetch;
pub mod session;
pub mod source;
pub mod traits;

pub use cache::{CacheConfig, CacheStats, CacheStore, SegmentCache};
pub use error::{best_effort, PlaybackError, Result};
pub use key::stable_key;
pub use prefetch::{
    PrefetchController, PrefetchHandle, PrefetchProgress, PrefetchRegistry, PrefetchRequest,
};
pub use session::{DataSourceRequest, EngineState, PlaybackSession};
pub use source::{
    CacheDataSource, CacheDataSourceFactory, CacheFlags, DataSource, DataSourceFactory, DataSpec,
    SourcePipeline,
};
pub use traits::{
    EngineFactory, EngineListener, MediaItem, MediaSource, MediaSourceKind, OutputKind,
    PlayerBinding, RepeatMode, VideoEngine, VideoOutput, VideoSurface,
};
