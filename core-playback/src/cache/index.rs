//! On-disk index of committed spans.
//!
//! The index is a single JSON document listing every key with its spans in
//! least-recently-used order. It is written to a sibling temporary file and
//! renamed over the previous version, so a crash leaves either the old or the
//! new index, never a torn one. A document that fails to parse is discarded
//! and the cache starts empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

pub(crate) const INDEX_VERSION: u32 = 1;

pub(crate) const SPAN_EXTENSION: &str = "span";
pub(crate) const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IndexFile {
    pub version: u32,
    pub entries: Vec<IndexRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IndexRecord {
    pub key: String,
    #[serde(default)]
    pub content_length: Option<u64>,
    pub last_access: DateTime<Utc>,
    pub spans: Vec<SpanRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SpanRecord {
    pub start: u64,
    pub length: u64,
}

/// Hex SHA-256 of the key; keeps file names short and filesystem-safe.
pub(crate) fn key_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// `<digest>.<start>.span`
pub(crate) fn span_file_name(key: &str, start: u64) -> String {
    format!("{}.{}.{}", key_digest(key), start, SPAN_EXTENSION)
}

/// `<digest>.<start>.<nonce>.tmp`
pub(crate) fn temp_file_name(key: &str, start: u64, nonce: &str) -> String {
    format!("{}.{}.{}.{}", key_digest(key), start, nonce, TEMP_EXTENSION)
}

/// Whether the file name belongs to the cache's own span or temp files.
pub(crate) fn is_cache_artifact(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == SPAN_EXTENSION || ext == TEMP_EXTENSION)
        .unwrap_or(false)
}

/// Read the index; `None` when it is missing, unreadable or corrupt.
pub(crate) fn load(path: &Path) -> Option<IndexFile> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache index unreadable, starting empty");
            return None;
        }
    };

    match serde_json::from_slice::<IndexFile>(&raw) {
        Ok(index) if index.version == INDEX_VERSION => Some(index),
        Ok(index) => {
            warn!(version = index.version, "Unsupported cache index version, starting empty");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache index corrupt, starting empty");
            if let Err(e) = fs::remove_file(path) {
                warn!(error = %e, "Failed to remove corrupt cache index");
            }
            None
        }
    }
}

/// Atomically replace the index at `path`.
pub(crate) fn save(path: &Path, index: &IndexFile) -> io::Result<()> {
    let data =
        serde_json::to_vec(index).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let tmp = temp_index_path(path);
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn temp_index_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(TEMP_EXTENSION);
    path.with_file_name(name)
}
