//! # Head Prefetch
//!
//! Warms the cache with the leading bytes of a resource before it is played.
//!
//! ## Overview
//!
//! [`PrefetchController::prefetch_head`] spawns one background task per call.
//! The task reads `[0, bytes)` through its own caching data source, so the
//! bytes land in the shared cache under the same stable key playback will
//! use later. The caller only gets a [`PrefetchHandle`]:
//!
//! - `cancel()` stops the read at its next await point; idempotent, and
//!   harmless after completion
//! - failures are logged and published on the event bus, never returned
//! - bytes written before a cancellation stay cached
//!
//! [`PrefetchRegistry`] maps opaque task ids to handles for callers that can
//! only pass strings around (the plugin channel). Unknown ids are ignored.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let controller = PrefetchController::new(pipeline, DEFAULT_PREFETCH_BYTES);
//! let handle = controller.prefetch_head(
//!     PrefetchRequest::new("https://cdn/clip.mp4?sig=abc").with_bytes(512 * 1024),
//! );
//! // Later, if the user scrolled past the clip:
//! handle.cancel();
//! ```

use chrono::Utc;
use core_runtime::config::PlayerConfig;
use core_runtime::events::{CoreEvent, EventBus, PrefetchEvent};
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, Instrument};

use crate::error::Result;
use crate::key::stable_key;
use crate::source::{DataSource, DataSpec, SourcePipeline};

/// Progress callback: called after every chunk that reached the cache.
pub type ProgressCallback = Arc<dyn Fn(PrefetchProgress) + Send + Sync>;

// ============================================================================
// Request & Progress
// ============================================================================

/// Progress of one prefetch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchProgress {
    /// Bytes of the requested range present in the cache so far.
    pub cached_bytes: u64,
    pub requested_bytes: u64,
    /// Bytes fetched from upstream since the previous report.
    pub newly_cached: u64,
}

/// Parameters of a head prefetch.
#[derive(Clone)]
pub struct PrefetchRequest {
    pub url: String,
    /// `None` uses the controller default.
    pub bytes: Option<u64>,
    /// Overrides the URL as the key source; the stable key is derived from it.
    pub cache_key: Option<String>,
    pub headers: HashMap<String, String>,
    pub user_agent: Option<String>,
    pub on_progress: Option<ProgressCallback>,
}

impl PrefetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bytes: None,
            cache_key: None,
            headers: HashMap::new(),
            user_agent: None,
            on_progress: None,
        }
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(PrefetchProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Key the prefetched bytes are cached under.
    pub fn resolved_key(&self) -> String {
        stable_key(self.cache_key.as_deref().unwrap_or(&self.url))
    }
}

impl fmt::Debug for PrefetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchRequest")
            .field("url", &redact_url(&self.url))
            .field("bytes", &self.bytes)
            .field("cache_key", &self.cache_key)
            .field("headers", &self.headers.len())
            .field("user_agent", &self.user_agent)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

// ============================================================================
// PrefetchHandle
// ============================================================================

static LAST_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Time-based task id, strictly increasing within the process.
fn next_task_id() -> String {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    let mut last = LAST_TASK_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TASK_ID.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next.to_string(),
            Err(actual) => last = actual,
        }
    }
}

/// Cancel handle of a running (or finished) prefetch task.
#[derive(Clone)]
pub struct PrefetchHandle {
    id: String,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl PrefetchHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stop the task at its next await point. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(task_id = %self.id, "Cancelling prefetch");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the task has ended (completed, failed or cancelled).
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Wait until the task has ended.
    pub async fn wait(&self) {
        self.done.cancelled().await;
    }
}

impl fmt::Debug for PrefetchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

// ============================================================================
// PrefetchController
// ============================================================================

/// Spawns head prefetch tasks over a [`SourcePipeline`].
#[derive(Clone)]
pub struct PrefetchController {
    pipeline: SourcePipeline,
    default_bytes: u64,
    event_bus: Option<EventBus>,
}

impl PrefetchController {
    pub fn new(pipeline: SourcePipeline, default_bytes: u64) -> Self {
        Self {
            pipeline,
            default_bytes,
            event_bus: None,
        }
    }

    pub fn from_config(config: &PlayerConfig, pipeline: SourcePipeline) -> Self {
        Self::new(pipeline, config.prefetch_default_bytes)
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn default_bytes(&self) -> u64 {
        self.default_bytes
    }

    /// Start caching `[0, bytes)` of `request.url` in the background.
    ///
    /// Must be called from within a Tokio runtime. Never blocks and never
    /// reports failure: the returned handle only allows cancelling.
    pub fn prefetch_head(&self, request: PrefetchRequest) -> PrefetchHandle {
        let id = next_task_id();
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        let task = PrefetchTask {
            id: id.clone(),
            key: request.resolved_key(),
            bytes: request.bytes.unwrap_or(self.default_bytes),
            pipeline: self.pipeline.clone(),
            event_bus: self.event_bus.clone(),
            request,
        };

        let span = tracing::debug_span!("prefetch", task_id = %id);
        let token = cancel.clone();
        let done_guard = done.clone().drop_guard();
        tokio::spawn(
            async move {
                let _done = done_guard;
                task.run(token).await;
            }
            .instrument(span),
        );

        PrefetchHandle { id, cancel, done }
    }
}

impl fmt::Debug for PrefetchController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchController")
            .field("pipeline", &self.pipeline)
            .field("default_bytes", &self.default_bytes)
            .finish_non_exhaustive()
    }
}

struct PrefetchTask {
    id: String,
    key: String,
    bytes: u64,
    pipeline: SourcePipeline,
    event_bus: Option<EventBus>,
    request: PrefetchRequest,
}

impl PrefetchTask {
    fn emit(&self, event: PrefetchEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Prefetch(event));
        }
    }

    async fn run(self, cancel: CancellationToken) {
        self.emit(PrefetchEvent::Started {
            task_id: self.id.clone(),
            cache_key: self.key.clone(),
            requested_bytes: self.bytes,
        });

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(key = %redact_url(&self.key), "Prefetch cancelled");
                self.emit(PrefetchEvent::Cancelled { task_id: self.id.clone() });
            }

            result = self.fetch_head() => match result {
                Ok(cached_bytes) => {
                    info!(key = %redact_url(&self.key), cached_bytes, "Prefetch completed");
                    self.emit(PrefetchEvent::Completed {
                        task_id: self.id.clone(),
                        cached_bytes,
                    });
                }
                Err(e) => {
                    debug!(key = %redact_url(&self.key), error = %e, "Prefetch failed");
                    self.emit(PrefetchEvent::Failed {
                        task_id: self.id.clone(),
                        message: e.to_string(),
                    });
                }
            },
        }
    }

    #[instrument(skip(self), fields(key = %redact_url(&self.key), bytes = self.bytes))]
    async fn fetch_head(&self) -> Result<u64> {
        let factory = self
            .pipeline
            .build_caching_source(self.request.user_agent.as_deref(), &self.request.headers)
            .await?;

        let already = factory.cache().cached_length(&self.key, 0, self.bytes);
        if already >= self.bytes {
            debug!(already, "Head already cached");
            self.report(already, 0);
            return Ok(already);
        }

        let spec = DataSpec::new(self.request.url.clone())
            .with_length(Some(self.bytes))
            .with_key(self.key.clone());

        let mut source = factory.create_cache_source();
        source.open(&spec).await?;

        let mut cached = 0u64;
        let mut upstream_seen = 0u64;
        while let Some(chunk) = source.read().await? {
            cached += chunk.len() as u64;
            let upstream = source.upstream_bytes();
            self.report(cached, upstream - upstream_seen);
            upstream_seen = upstream;
        }
        source.close().await?;

        Ok(cached)
    }

    fn report(&self, cached_bytes: u64, newly_cached: u64) {
        if let Some(callback) = &self.request.on_progress {
            callback(PrefetchProgress {
                cached_bytes,
                requested_bytes: self.bytes,
                newly_cached,
            });
        }
        self.emit(PrefetchEvent::Progress {
            task_id: self.id.clone(),
            cached_bytes,
            requested_bytes: self.bytes,
        });
    }
}

// ============================================================================
// PrefetchRegistry
// ============================================================================

/// Id to handle map of running prefetch tasks.
///
/// Entries disappear when their task ends or is cancelled.
#[derive(Clone, Default)]
pub struct PrefetchRegistry {
    tasks: Arc<Mutex<HashMap<String, PrefetchHandle>>>,
}

impl PrefetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a prefetch and track it; returns its opaque id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, controller: &PrefetchController, request: PrefetchRequest) -> String {
        let handle = controller.prefetch_head(request);
        let id = handle.id().to_string();
        self.tasks.lock().insert(id.clone(), handle.clone());

        let tasks: Weak<Mutex<HashMap<String, PrefetchHandle>>> = Arc::downgrade(&self.tasks);
        let finished_id = id.clone();
        tokio::spawn(async move {
            handle.wait().await;
            if let Some(tasks) = tasks.upgrade() {
                tasks.lock().remove(&finished_id);
            }
        });

        id
    }

    /// Cancel and forget `id`. Unknown or finished ids are a no-op.
    pub fn cancel(&self, id: &str) {
        match self.tasks.lock().remove(id) {
            Some(handle) => handle.cancel(),
            None => debug!(task_id = id, "No active prefetch with this id"),
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<PrefetchHandle> = self.tasks.lock().drain().map(|(_, h)| h).collect();
        for handle in drained {
            handle.cancel();
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.lock().contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl fmt::Debug for PrefetchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchRegistry")
            .field("active", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_are_unique_and_increasing() {
        let ids: Vec<u64> = (0..100)
            .map(|_| next_task_id().parse().unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_resolved_key_precedence() {
        let request = PrefetchRequest::new("https://host/a.mp4?sig=1");
        assert_eq!(request.resolved_key(), "https://host/a.mp4");

        let request = request.with_cache_key("https://mirror/b.mp4#t=3");
        assert_eq!(request.resolved_key(), "https://mirror/b.mp4");
    }

    #[tokio::test]
    async fn test_registry_unknown_id_is_noop() {
        let registry = PrefetchRegistry::new();
        registry.cancel("does-not-exist");
        registry.cancel("does-not-exist");
        assert_eq!(registry.active_count(), 0);
    }
}
