//! # Engine & Surface Traits
//!
//! Abstractions over the platform media engine and the visual surface it
//! renders into. The core never decodes video itself: hosts wrap their
//! engine (ExoPlayer, AVPlayer, a desktop player) in [`VideoEngine`] and
//! their view in [`VideoSurface`].
//!
//! ## Threading Model
//!
//! Engine calls are made from the UI-bound queue that drives the owning
//! [`PlaybackSession`](crate::PlaybackSession). Engines must deliver
//! [`EngineListener`] callbacks asynchronously (posted back to that queue or
//! from their own threads), never re-entrantly from inside an engine call.

use core_runtime::config::EngineSettings;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::source::DataSourceFactory;

// ============================================================================
// Media Types
// ============================================================================

/// Manifest suffix selecting segmented (HLS) demuxing.
pub const HLS_EXTENSION: &str = ".m3u8";

/// Item handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub uri: String,
    /// Key the caching source files this item under.
    pub custom_cache_key: Option<String>,
}

/// Container handling for a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSourceKind {
    /// Segmented streaming manifest.
    Hls,
    /// Single progressive file (MP4, WebM, ...).
    Progressive,
}

impl MediaSourceKind {
    /// `Hls` if the locator path ends in `.m3u8` (any case), else `Progressive`.
    pub fn for_uri(uri: &str) -> Self {
        let path = crate::key::stable_key(uri);
        if path.to_ascii_lowercase().ends_with(HLS_EXTENSION) {
            MediaSourceKind::Hls
        } else {
            MediaSourceKind::Progressive
        }
    }
}

/// Media item plus the data source factory the engine must read through.
#[derive(Clone)]
pub struct MediaSource {
    pub item: MediaItem,
    pub kind: MediaSourceKind,
    pub factory: Arc<dyn DataSourceFactory>,
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSource")
            .field("item", &self.item)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
    /// Restart the current item when it ends.
    One,
    Off,
}

impl RepeatMode {
    pub fn from_looping(looping: bool) -> Self {
        if looping {
            RepeatMode::One
        } else {
            RepeatMode::Off
        }
    }
}

// ============================================================================
// Surface Types
// ============================================================================

/// How decoded frames reach a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Frames are copied into a pixel buffer the view composites itself.
    /// Avoids the black flash of overlay surfaces on first frame.
    Texture,
    /// Dedicated overlay layer managed by the platform compositor.
    Overlay,
}

/// Render target the engine draws into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOutput {
    pub surface_id: String,
    pub kind: OutputKind,
    /// Platform handle (texture id, layer pointer), opaque to the core.
    pub handle: u64,
}

/// Marker a surface holds while a session's engine renders into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerBinding {
    pub session_id: String,
}

// ============================================================================
// Engine Traits
// ============================================================================

/// Callbacks from the engine to its owning session.
pub trait EngineListener: Send + Sync {
    /// Preparation finished; the engine can start rendering.
    fn on_ready(&self);

    /// First video frame of the current item reached the surface.
    fn on_rendered_first_frame(&self);

    /// Playback failed after the source's own fallbacks.
    fn on_error(&self, message: &str);
}

/// Platform media engine, one instance per session.
pub trait VideoEngine: Send {
    fn set_media_source(&mut self, source: MediaSource);

    fn set_repeat_mode(&mut self, mode: RepeatMode);

    /// Start asynchronous preparation of the assigned source.
    fn prepare(&mut self);

    fn set_play_when_ready(&mut self, play_when_ready: bool);

    fn seek_to(&mut self, position_ms: u64);

    fn set_volume(&mut self, volume: f32);

    /// # Errors
    ///
    /// Engines may reject an output in their current state.
    fn set_video_output(&mut self, output: VideoOutput) -> Result<()>;

    /// # Errors
    ///
    /// Engines that were never prepared may fail to clear; callers treat
    /// this as best effort.
    fn clear_video_output(&mut self) -> Result<()>;

    fn set_listener(&mut self, listener: Arc<dyn EngineListener>);

    /// Free decoders and surfaces; the instance is unusable afterwards.
    fn release(&mut self);
}

/// Builds engines configured with a buffering profile.
pub trait EngineFactory: Send + Sync {
    fn create_engine(&self, settings: &EngineSettings) -> Box<dyn VideoEngine>;
}

/// Platform view that can show one session's video.
pub trait VideoSurface: Send + Sync {
    fn surface_id(&self) -> String;

    /// Pixel-buffer backed output for this surface.
    fn texture_output(&self) -> Result<VideoOutput>;

    /// Record which session renders here; `None` unbinds.
    fn bind_player(&self, binding: Option<PlayerBinding>);
}
