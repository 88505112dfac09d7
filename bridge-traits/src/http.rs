//! HTTP Client Abstraction
//!
//! Provides ranged, streaming HTTP GET for media data sources. Bodies are
//! never buffered whole: callers pull [`Bytes`] chunks from a [`ByteStream`]
//! and may drop the stream at any point to abandon the transfer.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Boxed stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// URL without its query string and fragment.
///
/// Signed media URLs carry credentials in the query, so errors built by
/// this crate and its implementations name a resource by this form only.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Byte range requested from a resource, `length == None` meaning "to the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, length: Option<u64>) -> Self {
        Self { start, length }
    }

    /// Range starting at `start` and running to the end of the resource.
    pub fn from(start: u64) -> Self {
        Self::new(start, None)
    }

    /// Value for the `Range` request header.
    ///
    /// Returns `None` when the range covers the whole resource, in which case
    /// no header should be sent.
    pub fn header_value(&self) -> Option<String> {
        match self.length {
            Some(len) if len > 0 => Some(format!(
                "bytes={}-{}",
                self.start,
                self.start + len - 1
            )),
            _ if self.start == 0 => None,
            _ => Some(format!("bytes={}-", self.start)),
        }
    }
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub range: Option<ByteRange>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            range: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Merge several headers; later entries win on duplicate names.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.headers.insert(k.into(), v.into());
        }
        self
    }

    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.header("User-Agent", user_agent)
    }

    pub fn range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Streaming HTTP response
pub struct HttpResponseStream {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Length of the body about to be streamed, when announced by the server.
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl HttpResponseStream {
    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `206 Partial Content`: the server honored the requested range.
    pub fn is_partial_content(&self) -> bool {
        self.status == 206
    }

    /// `416 Range Not Satisfiable`: the requested start is past the end.
    pub fn is_range_not_satisfiable(&self) -> bool {
        self.status == 416
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Total resource length taken from `Content-Range: bytes a-b/total`.
    pub fn content_range_total(&self) -> Option<u64> {
        let value = self.header("Content-Range")?;
        let (_, total) = value.rsplit_once('/')?;
        total.trim().parse().ok()
    }

    /// Drain the body into a single buffer.
    pub async fn collect(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for HttpResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponseStream")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Transport settings fixed at client construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Maximum time to establish a connection.
    pub connect_timeout: Duration,
    /// Maximum silence between two body chunks.
    pub read_timeout: Duration,
    /// Follow redirects that switch between `http` and `https`.
    pub allow_cross_protocol_redirects: bool,
    /// Maximum redirect hops before giving up.
    pub max_redirects: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(8),
            read_timeout: Duration::from_secs(8),
            allow_cross_protocol_redirects: true,
            max_redirects: 10,
        }
    }
}

/// Async HTTP client trait
///
/// Implementations must apply [`HttpSettings`] to every request, send the
/// `Range` header derived from [`HttpRequest::range`], and return non-2xx
/// statuses as a response rather than an error so that callers can interpret
/// `416`.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{ByteRange, HttpClient, HttpRequest};
///
/// async fn head_bytes(client: &dyn HttpClient, url: &str) -> Result<Bytes> {
///     let request = HttpRequest::get(url).range(ByteRange::new(0, Some(1024)));
///     client.open(request).await?.collect().await
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a GET request and return the response with a streaming body.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails or exceeds the connect timeout
    /// - TLS validation fails
    /// - Redirect policy rejects a hop
    async fn open(&self, request: HttpRequest) -> Result<HttpResponseStream>;

    /// Settings this client was built with.
    fn settings(&self) -> &HttpSettings;

    /// Fetch a whole resource; fails on any non-2xx status.
    async fn fetch(&self, request: HttpRequest) -> Result<Bytes> {
        let url = strip_query(&request.url).to_string();
        let response = self.open(request).await?;
        if !response.is_success() {
            return Err(BridgeError::Http {
                status: response.status,
                url,
            });
        }
        response.collect().await
    }
}
