//! # Plugin Channel
//!
//! Instance-independent entry point: the `cached_video_player` method
//! channel (head prefetch) and the factory for player views.
//!
//! All views and prefetch tasks created by one plugin share a single
//! [`CacheStore`], so a prefetched head is what the next view plays from.

use bridge_traits::channel::{PLUGIN_CHANNEL, VIEW_TYPE};
use bridge_traits::{EventSink, ImageLoader, MethodCall, MethodResponse};
use core_playback::{
    CacheStore, EngineFactory, PlaybackSession, PrefetchController, PrefetchRegistry,
    PrefetchRequest, SourcePipeline, VideoSurface,
};
use core_runtime::config::PlayerConfig;
use core_runtime::events::EventBus;
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ServiceError};
use crate::view::{CachedPlayerView, CoverArtDisplay};

#[derive(Debug, Deserialize)]
struct PrefetchArgs {
    url: String,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct CancelPrefetchArgs {
    id: String,
}

/// Plugin-wide state: configuration, shared cache, prefetch tasks and views.
pub struct CachedVideoPlugin {
    config: PlayerConfig,
    store: CacheStore,
    pipeline: SourcePipeline,
    prefetch: PrefetchController,
    registry: PrefetchRegistry,
    engine_factory: Arc<dyn EngineFactory>,
    image_loader: Option<Arc<dyn ImageLoader>>,
    event_bus: EventBus,
    views: Mutex<HashMap<i64, Arc<CachedPlayerView>>>,
}

impl CachedVideoPlugin {
    pub fn new(config: PlayerConfig, engine_factory: Arc<dyn EngineFactory>) -> Self {
        let event_bus = EventBus::default();
        let store = CacheStore::from_player_config(&config).with_event_bus(event_bus.clone());
        let pipeline = SourcePipeline::from_config(&config, store.clone());
        let prefetch = PrefetchController::from_config(&config, pipeline.clone())
            .with_event_bus(event_bus.clone());

        info!(
            cache_directory = %config.cache_directory().display(),
            max_cache_bytes = config.max_cache_bytes,
            "Cached video plugin created"
        );

        Self {
            config,
            store,
            pipeline,
            prefetch,
            registry: PrefetchRegistry::new(),
            engine_factory,
            image_loader: None,
            event_bus,
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Plugin with the desktop cover art loader over the configured client.
    #[cfg(feature = "desktop-shims")]
    pub fn desktop(config: PlayerConfig, engine_factory: Arc<dyn EngineFactory>) -> Self {
        let loader = bridge_desktop::HttpImageLoader::new(
            Arc::clone(&config.http_client),
            config.default_user_agent.clone(),
        );
        Self::new(config, engine_factory).with_image_loader(Arc::new(loader))
    }

    pub fn with_image_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.image_loader = Some(loader);
        self
    }

    pub fn channel_name(&self) -> &'static str {
        PLUGIN_CHANNEL
    }

    /// Platform view type the host registers the view factory under.
    pub fn view_type(&self) -> &'static str {
        VIEW_TYPE
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn cache_store(&self) -> &CacheStore {
        &self.store
    }

    pub fn prefetch_registry(&self) -> &PrefetchRegistry {
        &self.registry
    }

    /// Diagnostics events of every view, prefetch task and the cache.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Answer one call on the plugin channel.
    #[instrument(skip(self, call), fields(method = %call.method))]
    pub async fn handle_method_call(&self, call: &MethodCall) -> MethodResponse {
        let result = match call.method.as_str() {
            "prefetchMp4Head" => self.prefetch_head(call).await.map(Value::String),
            "cancelPrefetch" => self.cancel_prefetch(call).map(|()| Value::Null),
            _ => return MethodResponse::NotImplemented,
        };

        match result {
            Ok(value) => MethodResponse::Success(value),
            Err(e) => {
                warn!(error = %e, code = e.code(), "Plugin call failed");
                e.to_response()
            }
        }
    }

    /// Create the binding for a new platform view.
    ///
    /// A view already registered under `view_id` is disposed first.
    pub fn create_view(
        &self,
        view_id: i64,
        surface: Arc<dyn VideoSurface>,
        cover: Arc<dyn CoverArtDisplay>,
        events: Arc<dyn EventSink>,
    ) -> Arc<CachedPlayerView> {
        let session = PlaybackSession::new(
            self.pipeline.clone(),
            Arc::clone(&self.engine_factory),
            self.config.engine,
        )
        .with_event_bus(self.event_bus.clone());

        let mut view = CachedPlayerView::new(view_id, session, surface, cover, events);
        if let Some(loader) = &self.image_loader {
            view = view.with_image_loader(Arc::clone(loader));
        }
        let view = Arc::new(view);

        debug!(view_id, channel = view.channel(), "View created");
        let previous = self.views.lock().insert(view_id, Arc::clone(&view));
        if let Some(previous) = previous {
            warn!(view_id, "Replacing live view with the same id");
            previous.dispose();
        }
        view
    }

    pub fn view(&self, view_id: i64) -> Option<Arc<CachedPlayerView>> {
        self.views.lock().get(&view_id).cloned()
    }

    /// Route a call from a view channel to its view.
    pub async fn handle_view_call(&self, view_id: i64, call: &MethodCall) -> MethodResponse {
        match self.view(view_id) {
            Some(view) => view.handle_method_call(call).await,
            None => ServiceError::UnknownView(view_id).to_response(),
        }
    }

    /// Dispose and forget a view. Unknown ids are ignored.
    pub fn dispose_view(&self, view_id: i64) {
        let removed = self.views.lock().remove(&view_id);
        if let Some(view) = removed {
            view.dispose();
        }
    }

    pub fn view_count(&self) -> usize {
        self.views.lock().len()
    }

    /// Cancel every prefetch, dispose every view and flush the cache index.
    pub fn shutdown(&self) {
        self.registry.cancel_all();
        let views: Vec<_> = self.views.lock().drain().map(|(_, v)| v).collect();
        for view in views {
            view.dispose();
        }
        if let Some(cache) = self.store.get() {
            core_playback::best_effort("flush_cache_index", || cache.flush());
        }
        info!("Cached video plugin shut down");
    }

    /// Start a head prefetch and return its task id.
    ///
    /// The cache is opened before the task starts, so an unusable cache
    /// directory is reported to the caller. Fetch failures inside the task
    /// stay silent.
    async fn prefetch_head(&self, call: &MethodCall) -> Result<String> {
        let args: PrefetchArgs = call.arguments()?;
        if args.url.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "prefetchMp4Head: url must not be empty".to_string(),
            ));
        }
        self.store.acquire().await?;

        debug!(url = %redact_url(&args.url), bytes = ?args.bytes, "Starting head prefetch");
        let mut request =
            PrefetchRequest::new(args.url).with_headers(args.headers.unwrap_or_default());
        if let Some(bytes) = args.bytes {
            request = request.with_bytes(bytes);
        }

        Ok(self.registry.start(&self.prefetch, request))
    }

    fn cancel_prefetch(&self, call: &MethodCall) -> Result<()> {
        let args: CancelPrefetchArgs = call.arguments()?;
        self.registry.cancel(&args.id);
        Ok(())
    }
}

impl fmt::Debug for CachedVideoPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedVideoPlugin")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("views", &self.view_count())
            .finish_non_exhaustive()
    }
}
