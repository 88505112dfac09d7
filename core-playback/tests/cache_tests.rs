//! Tests for the disk segment cache and its process-wide store
//!
//! This test suite verifies:
//! - Lazy, single-instance construction under concurrent acquire
//! - LRU eviction under the byte budget
//! - Index durability across reopen, including a corrupt index
//! - Failure to open an unwritable directory

use core_playback::{CacheConfig, CacheStore, PlaybackError, SegmentCache};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tempfile::TempDir;

async fn put(cache: &Arc<SegmentCache>, key: &str, start: u64, len: usize) -> u64 {
    let mut writer = cache.start_write(key, start).await.unwrap();
    writer.write(&vec![7u8; len]).await.unwrap();
    writer.commit().await.unwrap()
}

// ============================================================================
// CacheStore
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_yields_one_instance() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(CacheConfig::new(dir.path().join("video_cache")));
    assert!(store.get().is_none());

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move { store.acquire().await.unwrap() }));
    }

    let mut caches = Vec::new();
    for task in tasks {
        caches.push(task.await.unwrap());
    }

    let first = &caches[0];
    assert!(caches.iter().all(|c| Arc::ptr_eq(c, first)));
    assert!(Arc::ptr_eq(&store.get().unwrap(), first));
}

#[tokio::test]
async fn test_unwritable_directory_is_fatal() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"file in the way").unwrap();

    let store = CacheStore::new(CacheConfig::new(blocker.join("cache")));
    let err = store.acquire().await.unwrap_err();
    assert!(matches!(err, PlaybackError::CacheUnavailable(_)));
    assert!(store.get().is_none());
}

// ============================================================================
// Eviction
// ============================================================================

#[tokio::test]
async fn test_lru_eviction_keeps_total_under_budget() {
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new(32);
    let mut events = bus.subscribe();

    let config = CacheConfig::new(dir.path()).with_max_bytes(10_000);
    let cache = Arc::new(SegmentCache::open(config, Some(bus)).unwrap());

    put(&cache, "a", 0, 4_000).await;
    put(&cache, "b", 0, 4_000).await;
    // Touch "a" so "b" becomes the least recently used entry.
    assert!(cache.lookup("a", 0).is_some());
    put(&cache, "c", 0, 4_000).await;

    let stats = cache.stats();
    assert!(stats.total_bytes <= stats.max_bytes);
    assert_eq!(stats.entries, 2);
    assert!(cache.lookup("a", 0).is_some());
    assert!(cache.lookup("b", 0).is_none());
    assert!(cache.lookup("c", 0).is_some());

    let mut evicted = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Cache(CacheEvent::Evicted { cache_key, .. }) = event {
            evicted.push(cache_key);
        }
    }
    assert_eq!(evicted, vec!["b".to_string()]);
}

#[tokio::test]
async fn test_writing_key_evicts_its_own_spans_last() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::new(dir.path()).with_max_bytes(1_000);
    let cache = Arc::new(SegmentCache::open(config, None).unwrap());

    put(&cache, "k", 0, 600).await;
    put(&cache, "k", 600, 600).await;

    let stats = cache.stats();
    assert_eq!(stats.total_bytes, 600);
    assert!(cache.lookup("k", 0).is_none());
    assert!(cache.lookup("k", 600).is_some());
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn test_index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let cache = Arc::new(SegmentCache::open(CacheConfig::new(dir.path()), None).unwrap());
        put(&cache, "https://host/a.mp4", 0, 1_024).await;
        cache.set_content_length("https://host/a.mp4", 4_096);
        cache.flush().unwrap();
    }

    let cache = SegmentCache::open(CacheConfig::new(dir.path()), None).unwrap();
    assert_eq!(cache.cached_length("https://host/a.mp4", 0, 4_096), 1_024);
    assert_eq!(cache.content_length("https://host/a.mp4"), Some(4_096));
    assert_eq!(cache.stats().entries, 1);
}

#[tokio::test]
async fn test_corrupt_index_rebuilds_empty() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::new(dir.path());
    {
        let cache = Arc::new(SegmentCache::open(config.clone(), None).unwrap());
        put(&cache, "k", 0, 256).await;
    }

    std::fs::write(config.index_path(), b"{ not json").unwrap();

    let cache = SegmentCache::open(config, None).unwrap();
    let stats = cache.stats();
    assert_eq!(stats.total_bytes, 0);
    assert_eq!(stats.entries, 0);

    // Span files of the lost index are removed as orphans.
    let spans = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".span"))
        .count();
    assert_eq!(spans, 0);
}
