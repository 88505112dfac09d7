//! Cover-art loading.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Fetches encoded cover images (JPEG/PNG/WebP) for placeholder display.
///
/// Hosts usually back this with their image library so decoding and memory
/// caching stay on the platform side; the core only passes bytes through.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Bytes>;
}
