//! Network data source over the host [`HttpClient`].

use async_trait::async_trait;
use bridge_traits::http::{ByteRange, ByteStream, HttpClient, HttpRequest};
use bytes::Bytes;
use core_runtime::logging::redact_url;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{DataSource, DataSourceFactory, DataSpec};
use crate::error::{PlaybackError, Result};

/// Builds [`HttpDataSource`]s sharing a client, user agent and default headers.
#[derive(Clone)]
pub struct HttpDataSourceFactory {
    client: Arc<dyn HttpClient>,
    user_agent: String,
    default_headers: HashMap<String, String>,
}

impl HttpDataSourceFactory {
    pub fn new(client: Arc<dyn HttpClient>, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            default_headers: HashMap::new(),
        }
    }

    /// Merge headers sent with every request; later values win per name.
    ///
    /// A `User-Agent` entry is ignored, the factory's user agent always wins.
    pub fn with_default_headers(mut self, headers: HashMap<String, String>) -> Self {
        for (name, value) in headers {
            if !name.eq_ignore_ascii_case("user-agent") {
                self.default_headers.insert(name, value);
            }
        }
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn default_headers(&self) -> &HashMap<String, String> {
        &self.default_headers
    }

    pub fn create_http_source(&self) -> HttpDataSource {
        HttpDataSource {
            client: Arc::clone(&self.client),
            user_agent: self.user_agent.clone(),
            headers: self.default_headers.clone(),
            body: None,
            skip: 0,
            remaining: None,
            resource_length: None,
        }
    }
}

impl DataSourceFactory for HttpDataSourceFactory {
    fn create_data_source(&self) -> Box<dyn DataSource> {
        Box::new(self.create_http_source())
    }
}

/// Ranged GET of one [`DataSpec`].
///
/// Upstreams that ignore `Range` and answer `200` get their leading bytes
/// skipped locally. A `416` means the position lies past the end and reads
/// as an empty resource.
pub struct HttpDataSource {
    client: Arc<dyn HttpClient>,
    user_agent: String,
    headers: HashMap<String, String>,
    body: Option<ByteStream>,
    skip: u64,
    remaining: Option<u64>,
    resource_length: Option<u64>,
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn open(&mut self, spec: &DataSpec) -> Result<Option<u64>> {
        self.close().await?;
        self.resource_length = None;

        if spec.length == Some(0) {
            self.remaining = Some(0);
            return Ok(Some(0));
        }

        let request = HttpRequest::get(spec.uri.clone())
            .headers(self.headers.clone())
            .user_agent(self.user_agent.clone())
            .range(ByteRange::new(spec.position, spec.length));

        debug!(
            url = %redact_url(&spec.uri),
            position = spec.position,
            length = ?spec.length,
            "Opening HTTP source"
        );

        let response = self.client.open(request).await?;

        if response.is_range_not_satisfiable() {
            debug!(position = spec.position, "Range past end of resource");
            self.resource_length = response.content_range_total();
            self.remaining = Some(0);
            return Ok(Some(0));
        }

        if !response.is_success() {
            return Err(PlaybackError::Http {
                status: response.status,
                url: redact_url(&spec.uri).to_string(),
            });
        }

        let available = if response.is_partial_content() {
            self.resource_length = response.content_range_total();
            self.skip = 0;
            response.content_length
        } else {
            if spec.position > 0 {
                debug!(
                    skip = spec.position,
                    "Upstream ignored Range, skipping leading bytes"
                );
            }
            self.resource_length = response.content_length;
            self.skip = spec.position;
            response
                .content_length
                .map(|total| total.saturating_sub(spec.position))
        };

        self.remaining = match (spec.length, available) {
            (Some(wanted), Some(available)) => Some(wanted.min(available)),
            (Some(wanted), None) => Some(wanted),
            (None, available) => available,
        };
        self.body = Some(response.body);

        Ok(self.remaining)
    }

    async fn read(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.remaining == Some(0) {
                self.body = None;
                return Ok(None);
            }

            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };

            let mut chunk = match body.next().await {
                None => {
                    self.body = None;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.body = None;
                    return Err(e.into());
                }
                Some(Ok(chunk)) => chunk,
            };

            if self.skip > 0 {
                let skipped = self.skip.min(chunk.len() as u64);
                chunk = chunk.slice(skipped as usize..);
                self.skip -= skipped;
                if chunk.is_empty() {
                    continue;
                }
            }

            if let Some(remaining) = self.remaining {
                if chunk.len() as u64 > remaining {
                    chunk.truncate(remaining as usize);
                }
                self.remaining = Some(remaining - chunk.len() as u64);
            }

            trace!(bytes = chunk.len(), "HTTP chunk");
            return Ok(Some(chunk));
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.body = None;
        self.skip = 0;
        self.remaining = None;
        Ok(())
    }

    fn resource_length(&self) -> Option<u64> {
        self.resource_length
    }
}
