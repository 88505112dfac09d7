//! Channel layer and bootstrap helpers for the cached video player.
//!
//! This crate exposes the core to an application shell through two
//! surfaces:
//!
//! - [`CachedVideoPlugin`]: the `cached_video_player` plugin channel
//!   (`prefetchMp4Head`, `cancelPrefetch`) and the factory for player views.
//! - [`CachedPlayerView`]: one per platform view, answering
//!   `cached_video_player/view_<id>` and emitting `onFirstFrame`.
//!
//! The host supplies the decoder ([`EngineFactory`](core_playback::EngineFactory)),
//! the render target ([`VideoSurface`](core_playback::VideoSurface)), the cover
//! art layer ([`CoverArtDisplay`]) and an event sink. Desktop hosts enable the
//! `desktop-shims` feature (default) to get the reqwest HTTP client and cover
//! art loader from `bridge-desktop` injected automatically.
//!
//! ## Usage
//!
//! ```ignore
//! use core_service::{bootstrap_desktop, MethodCall};
//! use serde_json::json;
//!
//! let plugin = bootstrap_desktop("/var/cache/my-app", engine_factory)?;
//! let view = plugin.create_view(7, surface, cover, events);
//!
//! view.handle_method_call(&MethodCall::new(
//!     "setDataSource",
//!     json!({ "url": "https://cdn.example.com/clip.mp4?sig=abc", "autoPlay": true }),
//! ))
//! .await;
//! view.handle_method_call(&MethodCall::bare("attach")).await;
//! ```

pub mod error;
pub mod plugin;
pub mod view;

pub use bridge_traits::{EventSink, MethodCall, MethodResponse};
pub use error::{codes, Result, ServiceError};
pub use plugin::CachedVideoPlugin;
pub use view::{CachedPlayerView, CoverArtDisplay, FIRST_FRAME_EVENT};

#[cfg(feature = "desktop-shims")]
use std::{path::PathBuf, sync::Arc};

/// Convenience bootstrapper for desktop hosts.
///
/// Builds a [`PlayerConfig`](core_runtime::config::PlayerConfig) rooted at
/// `cache_root` with the reqwest client and wires the cover art loader.
///
/// # Errors
///
/// Returns [`ServiceError::InitializationFailed`] when the configuration is
/// rejected or the HTTP client cannot be built.
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(
    cache_root: impl Into<PathBuf>,
    engine_factory: Arc<dyn core_playback::EngineFactory>,
) -> Result<CachedVideoPlugin> {
    let config = core_runtime::config::PlayerConfig::builder()
        .cache_root(cache_root)
        .build()
        .map_err(|err| ServiceError::InitializationFailed(err.to_string()))?;
    Ok(CachedVideoPlugin::desktop(config, engine_factory))
}
