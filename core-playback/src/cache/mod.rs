//! # Video Cache Module
//!
//! Disk cache of byte spans for media resources, shared by playback and
//! prefetch.
//!
//! ## Overview
//!
//! - [`CacheStore`] - process-scoped handle, opens the cache once on demand
//! - [`SegmentCache`] - span files plus a JSON index, LRU eviction under a
//!   fixed byte budget (1 GiB by default)
//! - [`SpanWriter`] - write-then-commit of newly fetched bytes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   acquire()   ┌─────────────────────────────┐
//! │  CacheStore  │──────────────>│        SegmentCache         │
//! └──────────────┘   (once)      │  - lookup(key, pos)         │
//!        ▲                       │  - start_write(key, pos)    │
//!        │                       │  - cached_length(..)        │
//!  SourcePipeline                └──────┬──────────────────────┘
//!  PrefetchController                   ├──> <digest>.<start>.span
//!                                       └──> cache_index.json
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_playback::cache::{CacheConfig, CacheStore};
//!
//! let store = CacheStore::new(CacheConfig::new(cache_dir).with_max_bytes(512 << 20));
//! let cache = store.acquire().await?;
//! println!("cached: {} bytes", cache.stats().total_bytes);
//! ```
//!
//! There is no public delete API; entries leave the cache only through
//! eviction.

pub mod config;
mod index;
pub mod segment;
pub mod stats;
pub mod store;

pub use config::{CacheConfig, DEFAULT_MAX_SPAN_BYTES};
pub use segment::{CachedSpan, SegmentCache, SpanWriter};
pub use stats::CacheStats;
pub use store::CacheStore;
