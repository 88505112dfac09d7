//! Read-through caching data source.
//!
//! A read at position `p` is served from the span covering `p` when there is
//! one. Otherwise the hole from `p` up to the next cached span (or the end of
//! the request) is fetched upstream and written back as new spans while it is
//! being returned to the reader.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use super::http::{HttpDataSource, HttpDataSourceFactory};
use super::{DataSource, DataSourceFactory, DataSpec};
use crate::cache::{CachedSpan, SegmentCache, SpanWriter};
use crate::error::{PlaybackError, Result};

const READ_CHUNK_BYTES: u64 = 64 * 1024;

/// Behavior switches of [`CacheDataSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheFlags {
    /// On a cache read or write failure, continue from upstream without the
    /// cache instead of failing the read.
    pub ignore_cache_on_error: bool,
}

impl Default for CacheFlags {
    fn default() -> Self {
        Self {
            ignore_cache_on_error: true,
        }
    }
}

/// Byte counters shared by all sources of one factory.
#[derive(Debug, Default)]
pub struct SourceStats {
    from_cache: AtomicU64,
    from_upstream: AtomicU64,
}

impl SourceStats {
    pub fn bytes_from_cache(&self) -> u64 {
        self.from_cache.load(Ordering::Relaxed)
    }

    pub fn bytes_from_upstream(&self) -> u64 {
        self.from_upstream.load(Ordering::Relaxed)
    }
}

/// Builds [`CacheDataSource`]s over one cache and one upstream factory.
pub struct CacheDataSourceFactory {
    cache: Arc<SegmentCache>,
    upstream: Arc<HttpDataSourceFactory>,
    flags: CacheFlags,
    stats: Arc<SourceStats>,
}

impl CacheDataSourceFactory {
    pub fn new(
        cache: Arc<SegmentCache>,
        upstream: Arc<HttpDataSourceFactory>,
        flags: CacheFlags,
    ) -> Self {
        Self {
            cache,
            upstream,
            flags,
            stats: Arc::new(SourceStats::default()),
        }
    }

    pub fn cache(&self) -> &Arc<SegmentCache> {
        &self.cache
    }

    pub fn upstream(&self) -> &HttpDataSourceFactory {
        &self.upstream
    }

    pub fn flags(&self) -> CacheFlags {
        self.flags
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    pub fn create_cache_source(&self) -> CacheDataSource {
        CacheDataSource {
            cache: Arc::clone(&self.cache),
            upstream: Arc::clone(&self.upstream),
            flags: self.flags,
            stats: Arc::clone(&self.stats),
            uri: String::new(),
            key: String::new(),
            position: 0,
            remaining: None,
            bypass_cache: false,
            block: Block::Idle,
            upstream_bytes: 0,
        }
    }
}

impl DataSourceFactory for CacheDataSourceFactory {
    fn create_data_source(&self) -> Box<dyn DataSource> {
        Box::new(self.create_cache_source())
    }
}

enum Block {
    Idle,
    Cached {
        file: tokio::fs::File,
        left: u64,
    },
    Upstream {
        source: HttpDataSource,
        writer: Option<SpanWriter>,
        left: Option<u64>,
    },
}

enum BlockRead {
    Data(Bytes),
    /// The block is used up; more data may follow in the next block.
    Exhausted,
    /// Upstream ended before the block did.
    EndOfResource,
}

/// Data source that serves cached spans and backfills holes from upstream.
pub struct CacheDataSource {
    cache: Arc<SegmentCache>,
    upstream: Arc<HttpDataSourceFactory>,
    flags: CacheFlags,
    stats: Arc<SourceStats>,
    uri: String,
    key: String,
    position: u64,
    remaining: Option<u64>,
    bypass_cache: bool,
    block: Block,
    upstream_bytes: u64,
}

impl CacheDataSource {
    /// Cache key of the open spec.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes this source has pulled from upstream since it was created.
    pub fn upstream_bytes(&self) -> u64 {
        self.upstream_bytes
    }

    /// Whether a cache failure switched this source to upstream-only reads.
    pub fn is_bypassing_cache(&self) -> bool {
        self.bypass_cache
    }

    async fn open_next_block(&mut self) -> Result<bool> {
        if !self.bypass_cache {
            if let Some(span) = self.cache.lookup(&self.key, self.position) {
                match open_span(&span, self.position).await {
                    Ok(file) => {
                        self.block = Block::Cached {
                            file,
                            left: span.end() - self.position,
                        };
                        return Ok(true);
                    }
                    Err(e) => self.on_cache_error(e)?,
                }
            }

            if let Some(total) = self.cache.content_length(&self.key) {
                if self.position >= total {
                    return Ok(false);
                }
            }
        }

        let hole_end = if self.bypass_cache {
            None
        } else {
            self.cache.next_span_start(&self.key, self.position)
        };
        let hole = hole_end.map(|end| end - self.position);
        let block_len = match (self.remaining, hole) {
            (Some(remaining), Some(hole)) => Some(remaining.min(hole)),
            (remaining, None) => remaining,
            (None, hole) => hole,
        };

        let spec = DataSpec::new(self.uri.clone())
            .with_position(self.position)
            .with_length(block_len)
            .with_key(self.key.clone());

        let mut source = self.upstream.create_http_source();
        let available = source.open(&spec).await?;

        if let Some(total) = source.resource_length() {
            self.cache.set_content_length(&self.key, total);
        }

        if available == Some(0) {
            source.close().await?;
            return Ok(false);
        }

        let writer = if self.bypass_cache {
            None
        } else {
            match self.cache.start_write(&self.key, self.position).await {
                Ok(writer) => Some(writer),
                Err(e) => {
                    self.on_cache_error(e)?;
                    None
                }
            }
        };

        debug!(
            key = %self.key,
            position = self.position,
            length = ?available,
            caching = writer.is_some(),
            "Filling cache hole from upstream"
        );

        self.block = Block::Upstream {
            source,
            writer,
            left: available,
        };
        Ok(true)
    }

    async fn read_block(&mut self) -> Result<BlockRead> {
        let want = self
            .remaining
            .map_or(READ_CHUNK_BYTES, |r| r.min(READ_CHUNK_BYTES));

        match &mut self.block {
            Block::Idle => Ok(BlockRead::Exhausted),

            Block::Cached { file, left } => {
                if *left == 0 {
                    return Ok(BlockRead::Exhausted);
                }
                let mut buf = vec![0u8; want.min(*left) as usize];
                let n = file
                    .read(&mut buf)
                    .await
                    .map_err(|e| PlaybackError::CacheError(format!("span read failed: {}", e)))?;
                if n == 0 {
                    return Err(PlaybackError::CacheError("span file truncated".to_string()));
                }
                buf.truncate(n);
                *left -= n as u64;
                self.stats.from_cache.fetch_add(n as u64, Ordering::Relaxed);
                Ok(BlockRead::Data(Bytes::from(buf)))
            }

            Block::Upstream {
                source,
                writer,
                left,
            } => {
                let Some(chunk) = source.read().await? else {
                    return Ok(match left {
                        Some(0) => BlockRead::Exhausted,
                        _ => BlockRead::EndOfResource,
                    });
                };

                let len = chunk.len() as u64;
                if let Some(left) = left.as_mut() {
                    *left = left.saturating_sub(len);
                }
                self.upstream_bytes += len;
                self.stats.from_upstream.fetch_add(len, Ordering::Relaxed);

                if let Some(active) = writer.as_mut() {
                    if let Err(e) = active.write(&chunk).await {
                        warn!(error = %e, "Dropping cache write, continuing from upstream");
                        *writer = None;
                    }
                }

                // Roll over so an interrupted transfer keeps whole spans.
                let max_span = self.cache.config().max_span_bytes;
                if writer.as_ref().is_some_and(|w| w.len() >= max_span) {
                    if let Some(full) = writer.take() {
                        let next_start = full.start() + full.len();
                        if let Err(e) = full.commit().await {
                            warn!(error = %e, "Failed to commit span");
                        }
                        match self.cache.start_write(&self.key, next_start).await {
                            Ok(next) => *writer = Some(next),
                            Err(e) => warn!(error = %e, "Failed to start next span"),
                        }
                    }
                }

                Ok(BlockRead::Data(chunk))
            }
        }
    }

    /// Close the current block, committing whatever it wrote.
    async fn finish_block(&mut self) {
        match std::mem::replace(&mut self.block, Block::Idle) {
            Block::Idle | Block::Cached { .. } => {}
            Block::Upstream {
                mut source, writer, ..
            } => {
                if let Some(writer) = writer {
                    if let Err(e) = writer.commit().await {
                        warn!(key = %self.key, error = %e, "Failed to commit span");
                    }
                }
                let _ = source.close().await;
            }
        }
    }

    fn on_cache_error(&mut self, err: PlaybackError) -> Result<()> {
        if self.flags.ignore_cache_on_error {
            warn!(key = %self.key, error = %err, "Cache failed, reading upstream only");
            self.bypass_cache = true;
            Ok(())
        } else {
            Err(err)
        }
    }
}

#[async_trait]
impl DataSource for CacheDataSource {
    async fn open(&mut self, spec: &DataSpec) -> Result<Option<u64>> {
        self.finish_block().await;

        self.uri = spec.uri.clone();
        self.key = spec.cache_key();
        self.position = spec.position;
        self.remaining = spec.length;

        if let Some(total) = self.cache.content_length(&self.key) {
            let available = total.saturating_sub(self.position);
            self.remaining = Some(self.remaining.map_or(available, |r| r.min(available)));
        }

        Ok(self.remaining)
    }

    async fn read(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.remaining == Some(0) {
                self.finish_block().await;
                return Ok(None);
            }

            if matches!(self.block, Block::Idle) && !self.open_next_block().await? {
                return Ok(None);
            }

            match self.read_block().await {
                Ok(BlockRead::Data(chunk)) => {
                    let len = chunk.len() as u64;
                    self.position += len;
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining = remaining.saturating_sub(len);
                    }
                    return Ok(Some(chunk));
                }
                Ok(BlockRead::Exhausted) => self.finish_block().await,
                Ok(BlockRead::EndOfResource) => {
                    self.finish_block().await;
                    return Ok(None);
                }
                Err(e) if matches!(self.block, Block::Cached { .. }) && e.is_cache_error() => {
                    self.block = Block::Idle;
                    self.on_cache_error(e)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.finish_block().await;
        Ok(())
    }

    fn resource_length(&self) -> Option<u64> {
        self.cache.content_length(&self.key)
    }
}

async fn open_span(span: &CachedSpan, position: u64) -> Result<tokio::fs::File> {
    let mut file = tokio::fs::File::open(&span.path)
        .await
        .map_err(|e| PlaybackError::CacheError(format!("cannot open span: {}", e)))?;
    file.seek(SeekFrom::Start(position - span.start))
        .await
        .map_err(|e| PlaybackError::CacheError(format!("cannot seek span: {}", e)))?;
    Ok(file)
}
