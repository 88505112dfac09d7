//! Shared mocks for core-playback integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeError, ByteStream, HttpClient, HttpRequest, HttpResponseStream, HttpSettings,
};
use bytes::Bytes;
use core_playback::{
    CacheStore, EngineFactory, EngineListener, MediaSource, MediaSourceKind, OutputKind,
    PlaybackError, PlayerBinding, RepeatMode, Result, SourcePipeline, VideoEngine, VideoOutput,
    VideoSurface,
};
use core_runtime::config::{EngineSettings, PlayerConfig};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Mock HttpClient
// ============================================================================

/// Deterministic test payload.
pub fn pattern(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

/// In-memory origin serving ranged GETs. Resources are matched by URL with
/// the query stripped, so signed URLs with rotating tokens hit the same body.
pub struct MockHttpClient {
    resources: Mutex<HashMap<String, Bytes>>,
    settings: HttpSettings,
    chunk_size: usize,
    chunk_delay: Option<Duration>,
    ignore_range: bool,
    fail: AtomicBool,
    requests: AtomicUsize,
    bytes_served: Arc<AtomicU64>,
    last_headers: Mutex<HashMap<String, String>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            settings: HttpSettings::default(),
            chunk_size: 16 * 1024,
            chunk_delay: None,
            ignore_range: false,
            fail: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            bytes_served: Arc::new(AtomicU64::new(0)),
            last_headers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_resource(self, url: &str, body: Bytes) -> Self {
        self.resources.lock().insert(url.to_string(), body);
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Answer every request with the full body and status 200.
    pub fn ignoring_range(mut self) -> Self {
        self.ignore_range = true;
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Body bytes actually consumed by readers.
    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::SeqCst)
    }

    pub fn last_headers(&self) -> HashMap<String, String> {
        self.last_headers.lock().clone()
    }

    fn body_stream(&self, body: Bytes) -> ByteStream {
        let chunks: Vec<Bytes> = body
            .chunks(self.chunk_size)
            .map(Bytes::copy_from_slice)
            .collect();
        let served = Arc::clone(&self.bytes_served);
        let delay = self.chunk_delay;
        Box::pin(futures::stream::iter(chunks).then(move |chunk| {
            let served = Arc::clone(&served);
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                served.fetch_add(chunk.len() as u64, Ordering::SeqCst);
                Ok::<Bytes, BridgeError>(chunk)
            }
        }))
    }

    fn response(
        status: u16,
        headers: HashMap<String, String>,
        body: ByteStream,
        len: Option<u64>,
    ) -> HttpResponseStream {
        HttpResponseStream {
            status,
            headers,
            content_length: len,
            body,
        }
    }
}

fn empty_body() -> ByteStream {
    Box::pin(futures::stream::empty::<BridgeResult<Bytes>>())
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn open(&self, request: HttpRequest) -> BridgeResult<HttpResponseStream> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.last_headers.lock() = request.headers.clone();

        if self.fail.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("connection refused".to_string()));
        }

        let path = request.url.split('?').next().unwrap_or_default().to_string();
        let Some(body) = self.resources.lock().get(&path).cloned() else {
            return Ok(Self::response(404, HashMap::new(), empty_body(), Some(0)));
        };

        let total = body.len() as u64;
        let (start, length) = request
            .range
            .map(|r| (r.start, r.length))
            .unwrap_or((0, None));

        if self.ignore_range {
            let stream = self.body_stream(body);
            return Ok(Self::response(200, HashMap::new(), stream, Some(total)));
        }

        if start >= total && total > 0 {
            let mut headers = HashMap::new();
            headers.insert("Content-Range".to_string(), format!("bytes */{}", total));
            return Ok(Self::response(416, headers, empty_body(), Some(0)));
        }

        let end = length.map_or(total, |len| (start + len).min(total));
        let slice = body.slice(start as usize..end as usize);
        let mut headers = HashMap::new();
        headers.insert(
            "Content-Range".to_string(),
            format!("bytes {}-{}/{}", start, end.saturating_sub(1), total),
        );
        Ok(Self::response(206, headers, self.body_stream(slice), Some(end - start)))
    }

    fn settings(&self) -> &HttpSettings {
        &self.settings
    }
}

// ============================================================================
// Mock Engine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SetMediaSource {
        uri: String,
        key: Option<String>,
        kind: MediaSourceKind,
    },
    SetRepeatMode(RepeatMode),
    Prepare,
    PlayWhenReady(bool),
    SeekTo(u64),
    Volume(f32),
    SetOutput(String),
    ClearOutput,
    Release,
}

/// What the mock engines of one factory observed.
#[derive(Default)]
pub struct EngineRecorder {
    calls: Mutex<Vec<EngineCall>>,
    listener: Mutex<Option<Arc<dyn EngineListener>>>,
    source: Mutex<Option<MediaSource>>,
    builds: AtomicUsize,
}

impl EngineRecorder {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Listener of the most recently built engine.
    pub fn listener(&self) -> Option<Arc<dyn EngineListener>> {
        self.listener.lock().clone()
    }

    pub fn source(&self) -> Option<MediaSource> {
        self.source.lock().clone()
    }

    pub fn last_volume(&self) -> Option<f32> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            EngineCall::Volume(v) => Some(*v),
            _ => None,
        })
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

pub struct MockEngineFactory {
    pub recorder: Arc<EngineRecorder>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(EngineRecorder::default()),
        }
    }
}

impl EngineFactory for MockEngineFactory {
    fn create_engine(&self, _settings: &EngineSettings) -> Box<dyn VideoEngine> {
        self.recorder.builds.fetch_add(1, Ordering::SeqCst);
        Box::new(MockEngine {
            recorder: Arc::clone(&self.recorder),
            prepared: false,
        })
    }
}

struct MockEngine {
    recorder: Arc<EngineRecorder>,
    prepared: bool,
}

impl VideoEngine for MockEngine {
    fn set_media_source(&mut self, source: MediaSource) {
        self.recorder.record(EngineCall::SetMediaSource {
            uri: source.item.uri.clone(),
            key: source.item.custom_cache_key.clone(),
            kind: source.kind,
        });
        *self.recorder.source.lock() = Some(source);
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.recorder.record(EngineCall::SetRepeatMode(mode));
    }

    fn prepare(&mut self) {
        self.prepared = true;
        self.recorder.record(EngineCall::Prepare);
    }

    fn set_play_when_ready(&mut self, play_when_ready: bool) {
        self.recorder.record(EngineCall::PlayWhenReady(play_when_ready));
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.recorder.record(EngineCall::SeekTo(position_ms));
    }

    fn set_volume(&mut self, volume: f32) {
        self.recorder.record(EngineCall::Volume(volume));
    }

    fn set_video_output(&mut self, output: VideoOutput) -> Result<()> {
        assert_eq!(output.kind, OutputKind::Texture);
        self.recorder.record(EngineCall::SetOutput(output.surface_id));
        Ok(())
    }

    fn clear_video_output(&mut self) -> Result<()> {
        self.recorder.record(EngineCall::ClearOutput);
        if self.prepared {
            Ok(())
        } else {
            Err(PlaybackError::Engine("engine not prepared".to_string()))
        }
    }

    fn set_listener(&mut self, listener: Arc<dyn EngineListener>) {
        *self.recorder.listener.lock() = Some(listener);
    }

    fn release(&mut self) {
        self.recorder.record(EngineCall::Release);
    }
}

// ============================================================================
// Mock Surface
// ============================================================================

pub struct MockSurface {
    id: String,
    binding: Mutex<Option<PlayerBinding>>,
    unavailable: bool,
}

impl MockSurface {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            binding: Mutex::new(None),
            unavailable: false,
        })
    }

    /// Surface whose texture output cannot be created.
    pub fn unavailable(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            binding: Mutex::new(None),
            unavailable: true,
        })
    }

    pub fn binding(&self) -> Option<PlayerBinding> {
        self.binding.lock().clone()
    }
}

impl VideoSurface for MockSurface {
    fn surface_id(&self) -> String {
        self.id.clone()
    }

    fn texture_output(&self) -> Result<VideoOutput> {
        if self.unavailable {
            return Err(PlaybackError::Engine(format!("no texture for {}", self.id)));
        }
        Ok(VideoOutput {
            surface_id: self.id.clone(),
            kind: OutputKind::Texture,
            handle: 1,
        })
    }

    fn bind_player(&self, binding: Option<PlayerBinding>) {
        *self.binding.lock() = binding;
    }
}

// ============================================================================
// Environment
// ============================================================================

pub struct TestEnv {
    pub dir: TempDir,
    pub http: Arc<MockHttpClient>,
    pub config: PlayerConfig,
    pub store: CacheStore,
    pub pipeline: SourcePipeline,
}

pub fn test_env(http: MockHttpClient) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let http = Arc::new(http);
    let config = PlayerConfig::builder()
        .cache_root(dir.path())
        .http_client(http.clone())
        .build()
        .unwrap();
    let store = CacheStore::from_player_config(&config);
    let pipeline = SourcePipeline::from_config(&config, store.clone());
    TestEnv {
        dir,
        http,
        config,
        store,
        pipeline,
    }
}
