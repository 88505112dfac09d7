//! Cover-art loader backed by an [`HttpClient`].

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    http::{HttpClient, HttpRequest},
    image::ImageLoader,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Loads cover images over HTTP with the shared client.
pub struct HttpImageLoader {
    http_client: Arc<dyn HttpClient>,
    user_agent: String,
}

impl HttpImageLoader {
    pub fn new(http_client: Arc<dyn HttpClient>, user_agent: impl Into<String>) -> Self {
        Self {
            http_client,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<Bytes> {
        let request = HttpRequest::get(url).user_agent(self.user_agent.clone());
        let bytes = self.http_client.fetch(request).await?;
        debug!(bytes = bytes.len(), "Loaded cover image");
        Ok(bytes)
    }
}
