//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{strip_query, ByteStream, HttpClient, HttpRequest, HttpResponseStream, HttpSettings},
};
use futures_util::StreamExt;
use reqwest::{redirect, Client};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Provides media fetching with:
/// - Connection pooling via reqwest
/// - Connect timeout at the transport level
/// - Read timeout enforced between body chunks
/// - Redirect policy honoring `allow_cross_protocol_redirects`
pub struct ReqwestHttpClient {
    client: Client,
    settings: HttpSettings,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with the given transport settings.
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(10)
            .redirect(Self::redirect_policy(&settings))
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, settings })
    }

    /// Wrap an existing reqwest client (e.g. with a proxy or custom TLS).
    ///
    /// Only `read_timeout` from `settings` is enforced by this wrapper; the
    /// rest must already be configured on `client`.
    pub fn with_client(client: Client, settings: HttpSettings) -> Self {
        Self { client, settings }
    }

    fn redirect_policy(settings: &HttpSettings) -> redirect::Policy {
        let max_redirects = settings.max_redirects;
        let allow_cross_protocol = settings.allow_cross_protocol_redirects;

        redirect::Policy::custom(move |attempt| {
            // `previous` includes the original request.
            if attempt.previous().len() > max_redirects {
                return attempt.error("too many redirects");
            }
            if !allow_cross_protocol {
                let switches_scheme = attempt
                    .previous()
                    .last()
                    .map(|prev| prev.scheme() != attempt.url().scheme())
                    .unwrap_or(false);
                if switches_scheme {
                    return attempt.stop();
                }
            }
            attempt.follow()
        })
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self.client.get(&request.url);

        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if let Some(range) = request.range.and_then(|r| r.header_value()) {
            req = req.header(reqwest::header::RANGE, range);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    /// Body stream failing with [`BridgeError::Timeout`] once no chunk
    /// arrives within `read_timeout`. `url` must already be redacted.
    fn body_with_read_timeout(
        response: reqwest::Response,
        read_timeout: Duration,
        url: String,
    ) -> ByteStream {
        let body = Box::pin(response.bytes_stream());

        let stream = futures_util::stream::unfold(Some(body), move |state| {
            let url = url.clone();
            async move {
                let mut body = state?;
                match tokio::time::timeout(read_timeout, body.next()).await {
                    Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
                    Ok(Some(Err(e))) => Some((
                        Err(BridgeError::OperationFailed(e.without_url().to_string())),
                        None,
                    )),
                    Ok(None) => None,
                    Err(_) => {
                        warn!(url = %url, "HTTP body read timed out");
                        Some((Err(BridgeError::Timeout(format!("reading {}", url))), None))
                    }
                }
            }
        });

        Box::pin(stream)
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn open(&self, request: HttpRequest) -> Result<HttpResponseStream> {
        debug!(
            range = ?request.range,
            "Opening HTTP stream"
        );

        let response = self.build_request(&request).send().await.map_err(|e| {
            if e.is_timeout() {
                let host = e
                    .url()
                    .and_then(|u| u.host_str())
                    .unwrap_or_default()
                    .to_string();
                BridgeError::Timeout(format!("connecting to {}", host))
            } else if e.is_connect() {
                BridgeError::OperationFailed(format!("Connection failed: {}", e.without_url()))
            } else if e.is_redirect() {
                BridgeError::OperationFailed(format!("Redirect rejected: {}", e.without_url()))
            } else {
                BridgeError::OperationFailed(e.without_url().to_string())
            }
        })?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let url = strip_query(&request.url).to_string();
        let body = Self::body_with_read_timeout(response, self.settings.read_timeout, url);

        Ok(HttpResponseStream {
            status,
            headers,
            content_length,
            body,
        })
    }

    fn settings(&self) -> &HttpSettings {
        &self.settings
    }
}
