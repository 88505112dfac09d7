//! Shared fakes for core-service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeError, ByteStream, EventSink, HttpClient, HttpRequest, HttpResponseStream,
    HttpSettings, ImageLoader,
};
use bytes::Bytes;
use core_playback::{
    EngineFactory, EngineListener, MediaSource, OutputKind, PlayerBinding, RepeatMode, Result,
    VideoEngine, VideoOutput, VideoSurface,
};
use core_runtime::config::{EngineSettings, PlayerConfig};
use core_service::CoverArtDisplay;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Semaphore;

// ============================================================================
// Origin
// ============================================================================

pub fn pattern(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

/// Ranged origin keyed by URL without its query.
#[derive(Default)]
pub struct FakeOrigin {
    resources: Mutex<HashMap<String, Bytes>>,
    settings: HttpSettings,
    requests: AtomicUsize,
}

impl FakeOrigin {
    pub fn with_resource(self, url: &str, body: Bytes) -> Self {
        self.resources.lock().insert(url.to_string(), body);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for FakeOrigin {
    async fn open(&self, request: HttpRequest) -> BridgeResult<HttpResponseStream> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let path = request.url.split('?').next().unwrap_or_default().to_string();
        let Some(body) = self.resources.lock().get(&path).cloned() else {
            return Err(BridgeError::OperationFailed(format!("no route to {}", path)));
        };

        let total = body.len() as u64;
        let (start, length) = request
            .range
            .map(|r| (r.start, r.length))
            .unwrap_or((0, None));
        let end = length.map_or(total, |len| (start + len).min(total));
        let slice = body.slice(start.min(total) as usize..end as usize);

        let mut headers = HashMap::new();
        headers.insert(
            "Content-Range".to_string(),
            format!("bytes {}-{}/{}", start, end.saturating_sub(1), total),
        );
        let stream: ByteStream = Box::pin(futures::stream::iter(vec![Ok::<Bytes, BridgeError>(
            slice.clone(),
        )]));
        Ok(HttpResponseStream {
            status: 206,
            headers,
            content_length: Some(slice.len() as u64),
            body: stream,
        })
    }

    fn settings(&self) -> &HttpSettings {
        &self.settings
    }
}

pub fn player_config(dir: &TempDir, origin: Arc<FakeOrigin>) -> PlayerConfig {
    PlayerConfig::builder()
        .cache_root(dir.path())
        .http_client(origin)
        .prefetch_default_bytes(4_096)
        .build()
        .unwrap()
}

// ============================================================================
// Engine
// ============================================================================

/// Engines built by one [`FakeEngineFactory`] report here.
#[derive(Default)]
pub struct EngineLog {
    pub calls: Mutex<Vec<String>>,
    pub listener: Mutex<Option<Arc<dyn EngineListener>>>,
    pub builds: AtomicUsize,
}

impl EngineLog {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn listener(&self) -> Arc<dyn EngineListener> {
        self.listener.lock().clone().expect("engine listener registered")
    }

    fn push(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[derive(Default)]
pub struct FakeEngineFactory {
    pub log: Arc<EngineLog>,
}

impl EngineFactory for FakeEngineFactory {
    fn create_engine(&self, _settings: &EngineSettings) -> Box<dyn VideoEngine> {
        self.log.builds.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeEngine {
            log: Arc::clone(&self.log),
        })
    }
}

struct FakeEngine {
    log: Arc<EngineLog>,
}

impl VideoEngine for FakeEngine {
    fn set_media_source(&mut self, source: MediaSource) {
        self.log.push(format!("source {}", source.item.uri));
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.log.push(format!("repeat {:?}", mode));
    }

    fn prepare(&mut self) {
        self.log.push("prepare");
    }

    fn set_play_when_ready(&mut self, play_when_ready: bool) {
        self.log.push(format!("play_when_ready {}", play_when_ready));
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.log.push(format!("seek {}", position_ms));
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.push(format!("volume {}", volume));
    }

    fn set_video_output(&mut self, output: VideoOutput) -> Result<()> {
        self.log.push(format!("output {}", output.surface_id));
        Ok(())
    }

    fn clear_video_output(&mut self) -> Result<()> {
        self.log.push("clear_output");
        Ok(())
    }

    fn set_listener(&mut self, listener: Arc<dyn EngineListener>) {
        *self.log.listener.lock() = Some(listener);
    }

    fn release(&mut self) {
        self.log.push("release");
    }
}

// ============================================================================
// Surface and cover
// ============================================================================

#[derive(Default)]
pub struct FakeSurface {
    binding: Mutex<Option<PlayerBinding>>,
}

impl FakeSurface {
    pub fn is_bound(&self) -> bool {
        self.binding.lock().is_some()
    }
}

impl VideoSurface for FakeSurface {
    fn surface_id(&self) -> String {
        "texture-1".to_string()
    }

    fn texture_output(&self) -> Result<VideoOutput> {
        Ok(VideoOutput {
            surface_id: self.surface_id(),
            kind: OutputKind::Texture,
            handle: 42,
        })
    }

    fn bind_player(&self, binding: Option<PlayerBinding>) {
        *self.binding.lock() = binding;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoverOp {
    Placeholder,
    Artwork(Bytes),
    Show,
    Hide,
}

#[derive(Default)]
pub struct RecordingCover {
    ops: Mutex<Vec<CoverOp>>,
}

impl RecordingCover {
    pub fn ops(&self) -> Vec<CoverOp> {
        self.ops.lock().clone()
    }

    pub fn artwork_count(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, CoverOp::Artwork(_)))
            .count()
    }
}

impl CoverArtDisplay for RecordingCover {
    fn show_placeholder(&self) {
        self.ops.lock().push(CoverOp::Placeholder);
    }

    fn set_artwork(&self, image: Bytes) {
        self.ops.lock().push(CoverOp::Artwork(image));
    }

    fn show(&self) {
        self.ops.lock().push(CoverOp::Show);
    }

    fn hide(&self) {
        self.ops.lock().push(CoverOp::Hide);
    }
}

/// Image loader that holds every load until [`release`](Self::release).
pub struct GatedImageLoader {
    gate: Semaphore,
    loads: AtomicUsize,
}

impl Default for GatedImageLoader {
    fn default() -> Self {
        Self {
            gate: Semaphore::new(0),
            loads: AtomicUsize::new(0),
        }
    }
}

impl GatedImageLoader {
    pub fn release(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageLoader for GatedImageLoader {
    async fn load(&self, url: &str) -> BridgeResult<Bytes> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        permit.forget();
        Ok(Bytes::from(url.to_string()))
    }
}

/// Event sink remembering `(channel, event)` pairs.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, channel: &str, event: &str, _payload: Value) -> BridgeResult<()> {
        self.events
            .lock()
            .push((channel.to_string(), event.to_string()));
        Ok(())
    }
}
