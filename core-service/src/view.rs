//! # Player View Binding
//!
//! One [`CachedPlayerView`] per platform view instance. It owns a
//! [`PlaybackSession`], answers the view's method channel
//! (`cached_video_player/view_<id>`) and manages the cover art layer.
//!
//! ## Cover Art
//!
//! ```text
//! setDataSource ──▶ placeholder shown ──▶ (cover image loaded) ──▶ first frame ──▶ hidden
//!                                                                       │
//!                                   detach ──▶ shown again ◀────────────┘
//!                                   attach ──▶ frame rendered ──▶ hidden
//! ```
//!
//! Every frame rendered onto a freshly attached surface hides the cover
//! again, so a detach and re-attach without a new data source does not leave
//! it on screen. `onFirstFrame` is still emitted once per prepare cycle.
//!
//! The cover image loads independently of engine preparation. An image that
//! arrives after the first frame, or after another `setDataSource`, is
//! dropped.

use bridge_traits::channel::view_channel_name;
use bridge_traits::{EventSink, ImageLoader, MethodCall, MethodResponse};
use bytes::Bytes;
use core_playback::{DataSourceRequest, PlaybackSession, VideoSurface};
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::error::{Result, ServiceError};

/// Event emitted on the view channel once per prepare cycle.
pub const FIRST_FRAME_EVENT: &str = "onFirstFrame";

/// Host layer drawn above the video until it starts rendering.
pub trait CoverArtDisplay: Send + Sync {
    /// Reset to a black placeholder and show it.
    fn show_placeholder(&self);

    /// Replace the displayed image without changing visibility.
    fn set_artwork(&self, image: Bytes);

    /// Show the layer with its current image.
    fn show(&self);

    fn hide(&self);
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetDataSourceArgs {
    url: String,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(default)]
    auto_play: Option<bool>,
    #[serde(default)]
    looping: Option<bool>,
    #[serde(default)]
    cover_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SeekArgs {
    #[serde(default)]
    ms: Option<i64>,
}

// ============================================================================
// CachedPlayerView
// ============================================================================

#[derive(Default)]
struct CoverState {
    generation: u64,
    first_frame: bool,
    visible: bool,
    loading: Option<JoinHandle<()>>,
}

/// Channel adapter for one platform view.
pub struct CachedPlayerView {
    view_id: i64,
    channel: String,
    session: PlaybackSession,
    surface: Arc<dyn VideoSurface>,
    cover: Arc<dyn CoverArtDisplay>,
    image_loader: Option<Arc<dyn ImageLoader>>,
    cover_state: Arc<Mutex<CoverState>>,
    disposed: AtomicBool,
}

impl CachedPlayerView {
    pub fn new(
        view_id: i64,
        session: PlaybackSession,
        surface: Arc<dyn VideoSurface>,
        cover: Arc<dyn CoverArtDisplay>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let channel = view_channel_name(view_id);
        let cover_state = Arc::new(Mutex::new(CoverState::default()));

        {
            let cover_state = Arc::clone(&cover_state);
            let cover = Arc::clone(&cover);
            session.set_frame_rendered_listener(move || {
                let was_visible = std::mem::replace(&mut cover_state.lock().visible, false);
                if was_visible {
                    cover.hide();
                }
            });
        }
        {
            let cover_state = Arc::clone(&cover_state);
            let channel = channel.clone();
            session.set_first_frame_listener(move || {
                cover_state.lock().first_frame = true;
                if let Err(e) = events.emit(&channel, FIRST_FRAME_EVENT, Value::Null) {
                    debug!(channel = %channel, error = %e, "Dropping first frame event");
                }
            });
        }

        Self {
            view_id,
            channel,
            session,
            surface,
            cover,
            image_loader: None,
            cover_state,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn with_image_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.image_loader = Some(loader);
        self
    }

    pub fn view_id(&self) -> i64 {
        self.view_id
    }

    /// Name of this view's method and event channel.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Answer one call on the view channel.
    ///
    /// Unknown methods, and every call after [`dispose`](Self::dispose), get
    /// `NotImplemented`.
    #[instrument(skip(self, call), fields(view_id = self.view_id, method = %call.method))]
    pub async fn handle_method_call(&self, call: &MethodCall) -> MethodResponse {
        if self.is_disposed() {
            debug!("View disposed, ignoring call");
            return MethodResponse::NotImplemented;
        }

        let result = match call.method.as_str() {
            "setDataSource" => self.set_data_source(call).await,
            "attach" => self.attach(),
            "detach" => {
                self.detach();
                Ok(())
            }
            "play" => {
                self.session.play();
                Ok(())
            }
            "pause" => {
                self.session.pause();
                Ok(())
            }
            "seekTo" => self.seek_to(call),
            "release" => {
                self.session.release();
                Ok(())
            }
            _ => return MethodResponse::NotImplemented,
        };

        match result {
            Ok(()) => MethodResponse::ok(),
            Err(e) => {
                warn!(error = %e, code = e.code(), "View call failed");
                e.to_response()
            }
        }
    }

    /// Release the session and stop answering calls. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(view_id = self.view_id, "Disposing view");
        if let Some(task) = self.cover_state.lock().loading.take() {
            task.abort();
        }
        self.session.clear_first_frame_listener();
        self.session.release();
    }

    async fn set_data_source(&self, call: &MethodCall) -> Result<()> {
        let args: SetDataSourceArgs = call.arguments()?;
        if args.url.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "setDataSource: url must not be empty".to_string(),
            ));
        }

        {
            let mut state = self.cover_state.lock();
            state.generation += 1;
            state.first_frame = false;
            state.visible = true;
            if let Some(task) = state.loading.take() {
                task.abort();
            }
        }
        self.cover.show_placeholder();
        if let Some(cover_url) = args.cover_url.filter(|u| !u.trim().is_empty()) {
            self.load_cover(cover_url);
        }

        let mut request = DataSourceRequest::new(args.url)
            .with_auto_play(args.auto_play.unwrap_or(false))
            .with_looping(args.looping.unwrap_or(true))
            .with_headers(args.headers.unwrap_or_default());
        if let Some(user_agent) = args.user_agent {
            request = request.with_user_agent(user_agent);
        }

        self.session.set_data_source(request).await?;
        Ok(())
    }

    fn attach(&self) -> Result<()> {
        self.session.attach_to(Arc::clone(&self.surface))?;
        Ok(())
    }

    fn detach(&self) {
        self.session.detach();
        self.cover_state.lock().visible = true;
        self.cover.show();
    }

    fn seek_to(&self, call: &MethodCall) -> Result<()> {
        let args: SeekArgs = call.arguments()?;
        let ms = args.ms.unwrap_or(0).max(0) as u64;
        self.session.seek_to(ms);
        Ok(())
    }

    fn load_cover(&self, url: String) {
        let Some(loader) = self.image_loader.clone() else {
            debug!("No image loader, keeping placeholder");
            return;
        };

        let cover_state = Arc::clone(&self.cover_state);
        let cover = Arc::clone(&self.cover);
        let mut state = self.cover_state.lock();
        let generation = state.generation;

        state.loading = Some(tokio::spawn(async move {
            match loader.load(&url).await {
                Ok(image) => {
                    let state = cover_state.lock();
                    if state.generation == generation && !state.first_frame {
                        cover.set_artwork(image);
                    } else {
                        debug!(url = %redact_url(&url), "Cover arrived late, dropping");
                    }
                }
                Err(e) => debug!(url = %redact_url(&url), error = %e, "Cover load failed"),
            }
        }));
    }
}

impl Drop for CachedPlayerView {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for CachedPlayerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedPlayerView")
            .field("view_id", &self.view_id)
            .field("channel", &self.channel)
            .field("session", &self.session)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
