//! # Segment Cache
//!
//! Disk cache of byte spans keyed by stable key, bounded by a total size
//! budget with least-recently-used eviction.
//!
//! ## Layout
//!
//! ```text
//! video_cache/
//! ├── cache_index.json            keys, spans, content lengths (LRU order)
//! ├── <sha256(key)>.0.span        bytes [0, len) of a resource
//! ├── <sha256(key)>.2097152.span
//! └── <sha256(key)>.<n>.<id>.tmp  span being written, not yet indexed
//! ```
//!
//! Writers fill a temporary file and commit it with a rename. Only committed
//! spans count against the budget and only committed spans are evicted, so
//! eviction under write pressure never touches a partially written span.

use chrono::{DateTime, Utc};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::cache::config::CacheConfig;
use crate::cache::index::{self, IndexFile, IndexRecord, SpanRecord, INDEX_VERSION};
use crate::cache::stats::CacheStats;
use crate::error::{PlaybackError, Result};

/// A committed span that covers a requested position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSpan {
    pub key: String,
    pub start: u64,
    pub length: u64,
    pub path: PathBuf,
}

impl CachedSpan {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    /// start -> length; never overlapping
    spans: BTreeMap<u64, u64>,
    content_length: Option<u64>,
    last_access: DateTime<Utc>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            spans: BTreeMap::new(),
            content_length: None,
            last_access: Utc::now(),
        }
    }

    fn bytes(&self) -> u64 {
        self.spans.values().sum()
    }
}

struct CacheState {
    /// Most recently used first.
    entries: LruCache<String, CacheEntry>,
    total_bytes: u64,
}

/// Process-wide span cache; obtain it through [`CacheStore`](crate::cache::CacheStore).
pub struct SegmentCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
    persist_lock: Mutex<()>,
    event_bus: Option<EventBus>,
}

impl std::fmt::Debug for SegmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SegmentCache {
    /// Open the cache directory, loading and reconciling the index.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::CacheUnavailable`] if the directory cannot be
    /// created, listed or written. A corrupt index is not an error.
    #[instrument(skip_all, fields(directory = %config.directory.display()))]
    pub fn open(config: CacheConfig, event_bus: Option<EventBus>) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.directory).map_err(|e| {
            PlaybackError::CacheUnavailable(format!(
                "cannot create {}: {}",
                config.directory.display(),
                e
            ))
        })?;

        let mut records = index::load(&config.index_path())
            .map(|index| index.entries)
            .unwrap_or_default();
        records.sort_by_key(|record| record.last_access);

        let mut entries = LruCache::unbounded();
        let mut referenced = HashSet::new();
        let mut total_bytes = 0u64;

        // Oldest first, so the most recent record ends up most recently used.
        for record in records {
            let mut entry = CacheEntry {
                spans: BTreeMap::new(),
                content_length: record.content_length,
                last_access: record.last_access,
            };

            for span in record.spans {
                let name = index::span_file_name(&record.key, span.start);
                let on_disk = fs::metadata(config.directory.join(&name))
                    .map(|meta| meta.len())
                    .ok();
                if span.length == 0 || on_disk != Some(span.length) {
                    debug!(start = span.start, "Dropping span missing on disk");
                    continue;
                }
                entry.spans.insert(span.start, span.length);
                referenced.insert(name);
                total_bytes += span.length;
            }

            if !entry.spans.is_empty() || entry.content_length.is_some() {
                entries.put(record.key, entry);
            }
        }

        remove_orphans(&config.directory, &referenced)?;

        let cache = Self {
            config,
            state: Mutex::new(CacheState {
                entries,
                total_bytes,
            }),
            persist_lock: Mutex::new(()),
            event_bus,
        };

        {
            let mut state = cache.state.lock();
            cache.evict_to_fit(&mut state, 0, None);
        }

        // Writing the index up front doubles as the writability check.
        cache.persist().map_err(|e| {
            PlaybackError::CacheUnavailable(format!(
                "cannot write index in {}: {}",
                cache.config.directory.display(),
                e
            ))
        })?;

        let stats = cache.stats();
        info!(
            entries = stats.entries,
            total_bytes = stats.total_bytes,
            max_bytes = stats.max_bytes,
            "Segment cache opened"
        );
        cache.publish(CacheEvent::Initialized {
            directory: cache.config.directory.display().to_string(),
            entries: stats.entries,
            total_bytes: stats.total_bytes,
        });

        Ok(cache)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Find the span covering `position`, marking the key as recently used.
    pub fn lookup(&self, key: &str, position: u64) -> Option<CachedSpan> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(key)?;
        entry.last_access = Utc::now();

        let (&start, &length) = entry.spans.range(..=position).next_back()?;
        if position >= start + length {
            return None;
        }

        Some(CachedSpan {
            key: key.to_string(),
            start,
            length,
            path: self.span_path(key, start),
        })
    }

    /// Start of the first span beginning after `position`, bounding the hole
    /// that an upstream fetch at `position` may fill.
    pub fn next_span_start(&self, key: &str, position: u64) -> Option<u64> {
        let state = self.state.lock();
        let entry = state.entries.peek(key)?;
        entry
            .spans
            .range((Bound::Excluded(position), Bound::Unbounded))
            .next()
            .map(|(&start, _)| start)
    }

    /// Number of contiguous cached bytes in `[position, position + length)`
    /// starting at `position`.
    pub fn cached_length(&self, key: &str, position: u64, length: u64) -> u64 {
        let state = self.state.lock();
        let Some(entry) = state.entries.peek(key) else {
            return 0;
        };

        let limit = position.saturating_add(length);
        let mut cursor = position;
        while cursor < limit {
            match entry.spans.range(..=cursor).next_back() {
                Some((&start, &len)) if cursor < start + len => cursor = (start + len).min(limit),
                _ => break,
            }
        }
        cursor - position
    }

    /// Total resource length, once an upstream response revealed it.
    pub fn content_length(&self, key: &str) -> Option<u64> {
        self.state
            .lock()
            .entries
            .peek(key)
            .and_then(|entry| entry.content_length)
    }

    pub fn set_content_length(&self, key: &str, length: u64) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.peek_mut(key) {
            entry.content_length = Some(length);
        } else {
            let mut entry = CacheEntry::new();
            entry.content_length = Some(length);
            state.entries.put(key.to_string(), entry);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = CacheStats {
            total_bytes: state.total_bytes,
            max_bytes: self.config.max_bytes,
            calculated_at: Utc::now().timestamp(),
            ..CacheStats::default()
        };
        for (_, entry) in state.entries.iter() {
            if !entry.spans.is_empty() {
                stats.entries += 1;
                stats.spans += entry.spans.len();
            }
        }
        stats
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Begin writing a span at `position`.
    pub async fn start_write(self: &Arc<Self>, key: &str, position: u64) -> Result<SpanWriter> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let tmp_path = self
            .config
            .directory
            .join(index::temp_file_name(key, position, &nonce));

        let file = tokio::fs::File::create(&tmp_path).await.map_err(|e| {
            PlaybackError::CacheError(format!("cannot create span file: {}", e))
        })?;

        Ok(SpanWriter {
            cache: Arc::clone(self),
            key: key.to_string(),
            start: position,
            tmp_path,
            file: Some(file),
            written: 0,
        })
    }

    /// Move a finished temporary file into the index.
    ///
    /// Returns the number of bytes that became cached; `0` when the span was
    /// empty, larger than the budget, or partially overlapped an existing
    /// span (the existing data wins).
    fn commit_span(&self, key: &str, start: u64, length: u64, tmp_path: &Path) -> Result<u64> {
        if length == 0 || length > self.config.max_bytes {
            discard(tmp_path);
            return Ok(0);
        }

        let end = start + length;
        let mut state = self.state.lock();

        let overlapping: Vec<(u64, u64)> = state
            .entries
            .peek(key)
            .map(|entry| {
                entry
                    .spans
                    .range(..end)
                    .filter(|(s, l)| **s + **l > start)
                    .map(|(&s, &l)| (s, l))
                    .collect()
            })
            .unwrap_or_default();

        if overlapping.iter().any(|&(s, l)| s < start || s + l > end) {
            debug!(key = %key, start, length, "Span overlaps cached data, discarding");
            discard(tmp_path);
            return Ok(0);
        }

        // Spans fully inside the new one are replaced by it.
        for &(s, _) in &overlapping {
            self.remove_span(&mut state, key, s);
        }

        self.evict_to_fit(&mut state, length, Some((key, start)));

        let final_path = self.span_path(key, start);
        if let Err(e) = fs::rename(tmp_path, &final_path) {
            discard(tmp_path);
            return Err(PlaybackError::CacheError(format!(
                "cannot commit span: {}",
                e
            )));
        }

        if !state.entries.contains(key) {
            state.entries.put(key.to_string(), CacheEntry::new());
        }
        if let Some(entry) = state.entries.get_mut(key) {
            entry.spans.insert(start, length);
            entry.last_access = Utc::now();
        }
        state.total_bytes += length;
        drop(state);

        debug!(key = %key, start, length, "Committed span");

        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist cache index");
        }

        Ok(length)
    }

    /// Evict least recently used spans until `incoming` more bytes fit.
    ///
    /// `protect` names the key being written: its spans go last, and only
    /// when evicting every other key was not enough.
    fn evict_to_fit(&self, state: &mut CacheState, incoming: u64, protect: Option<(&str, u64)>) {
        let max = self.config.max_bytes;
        if state.total_bytes + incoming <= max {
            return;
        }

        let protected_key = protect.map(|(key, _)| key);
        let victims: Vec<String> = state
            .entries
            .iter()
            .rev()
            .map(|(key, _)| key.clone())
            .filter(|key| Some(key.as_str()) != protected_key)
            .collect();

        for key in victims {
            if state.total_bytes + incoming <= max {
                return;
            }
            if let Some(entry) = state.entries.pop(&key) {
                let bytes = entry.bytes();
                for &start in entry.spans.keys() {
                    discard(&self.span_path(&key, start));
                }
                state.total_bytes -= bytes;
                info!(key = %key, bytes, "Evicted cache entry");
                self.publish(CacheEvent::Evicted {
                    cache_key: key,
                    bytes,
                });
            }
        }

        if let Some((key, _)) = protect {
            let starts: Vec<u64> = state
                .entries
                .peek(key)
                .map(|entry| entry.spans.keys().copied().collect())
                .unwrap_or_default();
            for start in starts {
                if state.total_bytes + incoming <= max {
                    return;
                }
                self.remove_span(state, key, start);
            }
        }
    }

    fn remove_span(&self, state: &mut CacheState, key: &str, start: u64) {
        let removed = state
            .entries
            .peek_mut(key)
            .and_then(|entry| entry.spans.remove(&start));
        if let Some(length) = removed {
            state.total_bytes -= length;
            discard(&self.span_path(key, start));
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the index, including the current access order.
    pub fn flush(&self) -> Result<()> {
        self.persist()
            .map_err(|e| PlaybackError::CacheError(format!("cannot write index: {}", e)))
    }

    fn persist(&self) -> std::io::Result<()> {
        let _guard = self.persist_lock.lock();

        let snapshot = {
            let state = self.state.lock();
            IndexFile {
                version: INDEX_VERSION,
                entries: state
                    .entries
                    .iter()
                    .rev()
                    .map(|(key, entry)| IndexRecord {
                        key: key.clone(),
                        content_length: entry.content_length,
                        last_access: entry.last_access,
                        spans: entry
                            .spans
                            .iter()
                            .map(|(&start, &length)| SpanRecord { start, length })
                            .collect(),
                    })
                    .collect(),
            }
        };

        index::save(&self.config.index_path(), &snapshot)
    }

    fn span_path(&self, key: &str, start: u64) -> PathBuf {
        self.config
            .directory
            .join(index::span_file_name(key, start))
    }

    fn publish(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Cache(event));
        }
    }
}

fn remove_orphans(directory: &Path, referenced: &HashSet<String>) -> Result<()> {
    let listing = fs::read_dir(directory).map_err(|e| {
        PlaybackError::CacheUnavailable(format!("cannot list {}: {}", directory.display(), e))
    })?;

    for dir_entry in listing.flatten() {
        let name = dir_entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if index::is_cache_artifact(name) && !referenced.contains(name) {
            debug!(file = name, "Removing orphaned cache file");
            discard(&dir_entry.path());
        }
    }
    Ok(())
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}

// ============================================================================
// SpanWriter
// ============================================================================

/// Sequential writer for one span; nothing is visible until [`commit`](Self::commit).
///
/// Dropping an uncommitted writer deletes its temporary file.
pub struct SpanWriter {
    cache: Arc<SegmentCache>,
    key: String,
    start: u64,
    tmp_path: PathBuf,
    file: Option<tokio::fs::File>,
    written: u64,
}

impl SpanWriter {
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| PlaybackError::Internal("span writer already committed".into()))?;
        file.write_all(data)
            .await
            .map_err(|e| PlaybackError::CacheError(format!("span write failed: {}", e)))?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Flush and index the span; returns the bytes that became cached.
    pub async fn commit(mut self) -> Result<u64> {
        let Some(mut file) = self.file.take() else {
            return Ok(0);
        };

        if let Err(e) = file.flush().await {
            drop(file);
            discard(&self.tmp_path);
            return Err(PlaybackError::CacheError(format!(
                "span flush failed: {}",
                e
            )));
        }
        drop(file);

        // Rename and index rewrite are blocking filesystem calls.
        let cache = Arc::clone(&self.cache);
        let key = std::mem::take(&mut self.key);
        let (start, written) = (self.start, self.written);
        let tmp_path = self.tmp_path.clone();
        tokio::task::spawn_blocking(move || cache.commit_span(&key, start, written, &tmp_path))
            .await
            .map_err(|e| {
                discard(&self.tmp_path);
                PlaybackError::Internal(format!("span commit task failed: {}", e))
            })?
    }
}

impl Drop for SpanWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            discard(&self.tmp_path);
        }
    }
}
