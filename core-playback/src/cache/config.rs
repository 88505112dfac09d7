//! Cache configuration

use core_runtime::config::{PlayerConfig, DEFAULT_MAX_CACHE_BYTES};
use std::path::PathBuf;

use crate::error::{PlaybackError, Result};

/// Span files are rolled over at this size so that an interrupted transfer
/// keeps everything up to the last boundary.
pub const DEFAULT_MAX_SPAN_BYTES: u64 = 2 * 1024 * 1024;

/// Configuration for the segment cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding span files and the index
    pub directory: PathBuf,

    /// Total size budget for committed spans (default: 1 GiB)
    pub max_bytes: u64,

    /// File name of the persisted index inside `directory`
    pub index_file_name: String,

    /// Largest single span written by a caching source
    pub max_span_bytes: u64,
}

impl CacheConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_bytes: DEFAULT_MAX_CACHE_BYTES,
            index_file_name: "cache_index.json".to_string(),
            max_span_bytes: DEFAULT_MAX_SPAN_BYTES,
        }
    }

    /// Set the total size budget.
    pub fn with_max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = bytes;
        self
    }

    pub fn with_index_file_name(mut self, name: impl Into<String>) -> Self {
        self.index_file_name = name.into();
        self
    }

    pub fn with_max_span_bytes(mut self, bytes: u64) -> Self {
        self.max_span_bytes = bytes;
        self
    }

    /// Path of the persisted index.
    pub fn index_path(&self) -> PathBuf {
        self.directory.join(&self.index_file_name)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(PlaybackError::InvalidConfig(
                "cache directory cannot be empty".to_string(),
            ));
        }

        if self.max_bytes == 0 {
            return Err(PlaybackError::InvalidConfig(
                "max_bytes must be greater than 0".to_string(),
            ));
        }

        if self.max_span_bytes == 0 {
            return Err(PlaybackError::InvalidConfig(
                "max_span_bytes must be greater than 0".to_string(),
            ));
        }

        if self.index_file_name.is_empty() {
            return Err(PlaybackError::InvalidConfig(
                "index_file_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl From<&PlayerConfig> for CacheConfig {
    fn from(config: &PlayerConfig) -> Self {
        CacheConfig::new(config.cache_directory())
            .with_max_bytes(config.max_cache_bytes)
            .with_index_file_name(config.index_file_name.clone())
    }
}
