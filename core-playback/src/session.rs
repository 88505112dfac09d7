//! # Playback Session
//!
//! One engine instance, at most one attached surface, and the desired
//! playback parameters that must survive engine rebuilds.
//!
//! ## Engine State Machine
//!
//! ```text
//! Absent ──build──▶ Built ──set_data_source──▶ SourceAssigned ──prepare──▶ Preparing
//!                                                                            │ on_ready
//!                                                                            ▼
//!   Released ◀──release── (any) ◀──────────────── Ready ◀──▶ Playing ◀──▶ Paused
//! ```
//!
//! Any mutating call made while the engine is `Absent` builds it first.
//! `release()` is terminal for the engine instance; the next
//! `set_data_source` rebuilds from scratch. Attaching and detaching a surface
//! are orthogonal to this state.
//!
//! ## Threading
//!
//! All session calls are expected from one logical queue. Engine callbacks
//! arrive on other threads, so the session state sits behind a mutex that is
//! never held while user callbacks run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let session = PlaybackSession::new(pipeline, engine_factory, EngineSettings::default());
//! session.set_first_frame_listener(|| cover.hide());
//! session
//!     .set_data_source(DataSourceRequest::new(url).with_auto_play(true))
//!     .await?;
//! session.attach_to(surface)?;
//! ```

use core_runtime::config::EngineSettings;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{best_effort, Result};
use crate::key::stable_key;
use crate::source::SourcePipeline;
use crate::traits::{
    EngineFactory, EngineListener, MediaItem, MediaSource, MediaSourceKind, PlayerBinding,
    RepeatMode, VideoEngine, VideoSurface,
};

/// Callback fired when the first frame of a prepare cycle is rendered.
pub type FirstFrameCallback = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// Engine State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Absent,
    Built,
    SourceAssigned,
    Preparing,
    Ready,
    Playing,
    Paused,
    Released,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Absent => "absent",
            EngineState::Built => "built",
            EngineState::SourceAssigned => "source_assigned",
            EngineState::Preparing => "preparing",
            EngineState::Ready => "ready",
            EngineState::Playing => "playing",
            EngineState::Paused => "paused",
            EngineState::Released => "released",
        }
    }

    /// Whether an engine instance exists in this state.
    pub fn has_engine(&self) -> bool {
        !matches!(self, EngineState::Absent | EngineState::Released)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DataSourceRequest
// ============================================================================

/// Parameters of [`PlaybackSession::set_data_source`].
#[derive(Debug, Clone)]
pub struct DataSourceRequest {
    pub url: String,
    /// Empty or `None` selects the pipeline's default user agent.
    pub user_agent: Option<String>,
    pub headers: HashMap<String, String>,
    pub auto_play: bool,
    pub looping: bool,
}

impl DataSourceRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: None,
            headers: HashMap::new(),
            auto_play: false,
            looping: true,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = auto_play;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

// ============================================================================
// Session State
// ============================================================================

#[derive(Default)]
struct FirstFrameGate {
    cycle: u64,
    fired: bool,
    callback: Option<FirstFrameCallback>,
    /// Runs on every rendered first frame, including after a re-attach.
    on_render: Option<FirstFrameCallback>,
}

struct SessionState {
    engine: Option<Box<dyn VideoEngine>>,
    state: EngineState,
    /// Bumped on every engine build; stale listeners compare against it.
    generation: u64,
    volume: f32,
    looping: bool,
    play_when_ready: bool,
    media_uri: Option<String>,
    cache_key: Option<String>,
    surface: Option<Arc<dyn VideoSurface>>,
    first_frame: FirstFrameGate,
}

impl SessionState {
    fn new() -> Self {
        Self {
            engine: None,
            state: EngineState::Absent,
            generation: 0,
            volume: 1.0,
            looping: true,
            play_when_ready: false,
            media_uri: None,
            cache_key: None,
            surface: None,
            first_frame: FirstFrameGate::default(),
        }
    }
}

/// Context shared with engine listeners.
#[derive(Clone)]
struct Shared {
    session_id: String,
    event_bus: Option<EventBus>,
}

impl Shared {
    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Playback(event));
        }
    }

    fn transition(&self, state: &mut SessionState, to: EngineState) {
        let from = state.state;
        if from == to {
            return;
        }
        state.state = to;
        debug!(session_id = %self.session_id, %from, %to, "Engine state changed");
        self.emit(PlaybackEvent::StateChanged {
            session_id: self.session_id.clone(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }
}

// ============================================================================
// PlaybackSession
// ============================================================================

/// Owns one engine instance and its surface binding.
pub struct PlaybackSession {
    shared: Shared,
    pipeline: SourcePipeline,
    engine_factory: Arc<dyn EngineFactory>,
    engine_settings: EngineSettings,
    state: Arc<Mutex<SessionState>>,
}

impl PlaybackSession {
    pub fn new(
        pipeline: SourcePipeline,
        engine_factory: Arc<dyn EngineFactory>,
        engine_settings: EngineSettings,
    ) -> Self {
        Self {
            shared: Shared {
                session_id: Uuid::new_v4().to_string(),
                event_bus: None,
            },
            pipeline,
            engine_factory,
            engine_settings,
            state: Arc::new(Mutex::new(SessionState::new())),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.shared.event_bus = Some(event_bus);
        self
    }

    pub fn id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn pipeline(&self) -> &SourcePipeline {
        &self.pipeline
    }

    pub fn state(&self) -> EngineState {
        self.state.lock().state
    }

    /// Desired volume, reapplied whenever the engine is rebuilt.
    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn is_looping(&self) -> bool {
        self.state.lock().looping
    }

    pub fn play_when_ready(&self) -> bool {
        self.state.lock().play_when_ready
    }

    pub fn media_uri(&self) -> Option<String> {
        self.state.lock().media_uri.clone()
    }

    /// Cache key of the current media item.
    pub fn cache_key(&self) -> Option<String> {
        self.state.lock().cache_key.clone()
    }

    pub fn attached_surface_id(&self) -> Option<String> {
        self.state.lock().surface.as_ref().map(|s| s.surface_id())
    }

    /// Number of prepare cycles started so far.
    pub fn prepare_cycle(&self) -> u64 {
        self.state.lock().first_frame.cycle
    }

    /// Install the first-frame callback, replacing any previous one.
    pub fn set_first_frame_listener<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.state.lock().first_frame.callback = Some(Arc::new(callback));
    }

    /// Install a callback run each time the engine reports a first frame on
    /// its surface, not only once per prepare cycle. A re-attached surface
    /// produces a new report without a new prepare cycle.
    pub fn set_frame_rendered_listener<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.state.lock().first_frame.on_render = Some(Arc::new(callback));
    }

    /// Remove both the first-frame and the frame-rendered callbacks.
    pub fn clear_first_frame_listener(&self) {
        let mut state = self.state.lock();
        state.first_frame.callback = None;
        state.first_frame.on_render = None;
    }

    /// Assign a new media item and start preparing it.
    ///
    /// Builds the engine if there is none (first use or after `release`).
    /// The item is tagged with the stable key of `url`, so signed URLs that
    /// only differ in their query share one cache entry.
    ///
    /// # Errors
    ///
    /// Returns `CacheUnavailable` when the disk cache cannot be opened.
    #[instrument(skip(self, request), fields(session_id = %self.shared.session_id, url = %redact_url(&request.url)))]
    pub async fn set_data_source(&self, request: DataSourceRequest) -> Result<()> {
        let factory = self
            .pipeline
            .build_caching_source(request.user_agent.as_deref(), &request.headers)
            .await?;

        let cache_key = stable_key(&request.url);
        let kind = MediaSourceKind::for_uri(&request.url);
        let source = MediaSource {
            item: MediaItem {
                uri: request.url.clone(),
                custom_cache_key: Some(cache_key.clone()),
            },
            kind,
            factory,
        };

        let mut state = self.state.lock();
        self.ensure_engine(&mut state);

        state.media_uri = Some(request.url);
        state.cache_key = Some(cache_key.clone());
        state.looping = request.looping;
        state.play_when_ready = request.auto_play;
        state.first_frame.cycle += 1;
        state.first_frame.fired = false;

        let volume = state.volume;
        if let Some(engine) = state.engine.as_mut() {
            engine.set_media_source(source);
            engine.set_repeat_mode(RepeatMode::from_looping(request.looping));
        }
        self.shared.transition(&mut state, EngineState::SourceAssigned);

        if let Some(engine) = state.engine.as_mut() {
            engine.prepare();
            // Engines may reset volume while preparing.
            engine.set_volume(volume);
            engine.set_play_when_ready(request.auto_play);
        }
        self.shared.transition(&mut state, EngineState::Preparing);

        info!(
            key = %redact_url(&cache_key),
            kind = ?kind,
            auto_play = request.auto_play,
            looping = request.looping,
            "Data source assigned"
        );
        self.shared.emit(PlaybackEvent::DataSourceSet {
            session_id: self.shared.session_id.clone(),
            cache_key,
        });
        Ok(())
    }

    /// Render into `surface`, detaching any previously attached one.
    ///
    /// Ignored after `release()` until the next `set_data_source`.
    ///
    /// # Errors
    ///
    /// Fails if the surface cannot provide a texture output or the engine
    /// rejects it.
    #[instrument(skip(self, surface), fields(session_id = %self.shared.session_id, surface_id = %surface.surface_id()))]
    pub fn attach_to(&self, surface: Arc<dyn VideoSurface>) -> Result<()> {
        let mut state = self.state.lock();
        if state.state == EngineState::Released {
            debug!("Session released, ignoring attach");
            return Ok(());
        }

        self.ensure_engine(&mut state);
        // A surface without an output leaves the current binding in place.
        let output = surface.texture_output()?;

        if let Some(engine) = state.engine.as_mut() {
            best_effort("clear_video_output", || engine.clear_video_output());
        }
        if let Some(previous) = state.surface.take() {
            debug!(previous = %previous.surface_id(), "Detaching previous surface");
            previous.bind_player(None);
        }
        if let Some(engine) = state.engine.as_mut() {
            engine.set_video_output(output)?;
        }
        surface.bind_player(Some(PlayerBinding {
            session_id: self.shared.session_id.clone(),
        }));
        state.surface = Some(surface);
        Ok(())
    }

    /// Unbind the surface and pause. Safe in every state.
    #[instrument(skip(self), fields(session_id = %self.shared.session_id))]
    pub fn detach(&self) {
        let mut state = self.state.lock();
        self.detach_locked(&mut state);
    }

    pub fn play(&self) {
        self.set_play_intent(true);
    }

    pub fn pause(&self) {
        self.set_play_intent(false);
    }

    pub fn seek_to(&self, position_ms: u64) {
        let mut state = self.state.lock();
        if let Some(engine) = state.engine.as_mut() {
            engine.seek_to(position_ms);
        }
    }

    /// Store the desired volume clamped to `[0, 1]` and apply it if an engine
    /// exists. NaN is treated as silence.
    pub fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        let mut state = self.state.lock();
        state.volume = volume;
        if let Some(engine) = state.engine.as_mut() {
            engine.set_volume(volume);
        }
    }

    /// Detach and free the engine. Idempotent.
    #[instrument(skip(self), fields(session_id = %self.shared.session_id))]
    pub fn release(&self) {
        let mut state = self.state.lock();
        self.detach_locked(&mut state);

        let Some(mut engine) = state.engine.take() else {
            return;
        };
        engine.release();
        self.shared.transition(&mut state, EngineState::Released);
        info!("Engine released");
        self.shared.emit(PlaybackEvent::Released {
            session_id: self.shared.session_id.clone(),
        });
    }

    fn ensure_engine(&self, state: &mut SessionState) {
        if state.engine.is_some() {
            return;
        }
        if state.state == EngineState::Released {
            self.shared.transition(state, EngineState::Absent);
        }

        let mut engine = self.engine_factory.create_engine(&self.engine_settings);
        state.generation += 1;
        engine.set_listener(Arc::new(SessionListener {
            shared: self.shared.clone(),
            state: Arc::downgrade(&self.state),
            generation: state.generation,
        }));
        engine.set_volume(state.volume);
        state.engine = Some(engine);

        debug!(generation = state.generation, "Engine built");
        self.shared.transition(state, EngineState::Built);
    }

    fn detach_locked(&self, state: &mut SessionState) {
        if let Some(surface) = state.surface.take() {
            surface.bind_player(None);
        }

        state.play_when_ready = false;
        if let Some(engine) = state.engine.as_mut() {
            engine.set_play_when_ready(false);
            best_effort("clear_video_output", || engine.clear_video_output());
        }
        if state.state == EngineState::Playing {
            self.shared.transition(state, EngineState::Paused);
        }
    }

    fn set_play_intent(&self, play: bool) {
        let mut state = self.state.lock();
        let Some(engine) = state.engine.as_mut() else {
            return;
        };
        engine.set_play_when_ready(play);
        state.play_when_ready = play;

        let next = match (state.state, play) {
            (EngineState::Ready | EngineState::Paused, true) => EngineState::Playing,
            (EngineState::Playing, false) => EngineState::Paused,
            (current, _) => current,
        };
        self.shared.transition(&mut state, next);
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.engine.is_some() {
            warn!(session_id = %self.shared.session_id, "Session dropped without release");
        }
        if let Some(surface) = state.surface.take() {
            surface.bind_player(None);
        }
        if let Some(mut engine) = state.engine.take() {
            engine.release();
        }
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.shared.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

pub(crate) fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Engine Listener
// ============================================================================

struct SessionListener {
    shared: Shared,
    state: Weak<Mutex<SessionState>>,
    generation: u64,
}

impl SessionListener {
    fn current_state(&self) -> Option<Arc<Mutex<SessionState>>> {
        let state = self.state.upgrade()?;
        let current = state.lock().generation == self.generation;
        current.then_some(state)
    }
}

impl EngineListener for SessionListener {
    fn on_ready(&self) {
        let Some(state) = self.current_state() else {
            return;
        };
        let mut state = state.lock();
        if state.state == EngineState::Preparing {
            let next = if state.play_when_ready {
                EngineState::Playing
            } else {
                EngineState::Ready
            };
            self.shared.transition(&mut state, next);
        }
    }

    fn on_rendered_first_frame(&self) {
        let Some(state) = self.current_state() else {
            return;
        };

        let (on_render, first, cycle) = {
            let mut state = state.lock();
            let gate = &mut state.first_frame;
            if gate.cycle == 0 {
                return;
            }
            let first = if gate.fired {
                None
            } else {
                gate.fired = true;
                Some(gate.callback.clone())
            };
            (gate.on_render.clone(), first, gate.cycle)
        };

        if let Some(on_render) = on_render {
            on_render();
        }
        let Some(callback) = first else {
            return;
        };

        debug!(session_id = %self.shared.session_id, cycle, "First frame rendered");
        self.shared.emit(PlaybackEvent::FirstFrame {
            session_id: self.shared.session_id.clone(),
            cycle,
        });
        if let Some(callback) = callback {
            callback();
        }
    }

    fn on_error(&self, message: &str) {
        if self.current_state().is_none() {
            return;
        }
        warn!(session_id = %self.shared.session_id, error = message, "Engine reported playback error");
    }
}
