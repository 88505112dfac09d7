use bridge_traits::{BridgeError, MethodResponse};
use core_playback::PlaybackError;
use thiserror::Error;

/// Channel error codes returned to the application shell.
pub mod codes {
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const CACHE_UNAVAILABLE: &str = "CACHE_UNAVAILABLE";
    pub const PLAYBACK_ERROR: &str = "PLAYBACK_ERROR";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown view: {0}")]
    UnknownView(i64),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

impl ServiceError {
    /// Channel error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgument(_) | ServiceError::UnknownView(_) => {
                codes::INVALID_ARGUMENT
            }
            ServiceError::Playback(PlaybackError::CacheUnavailable(_)) => codes::CACHE_UNAVAILABLE,
            ServiceError::Playback(_) => codes::PLAYBACK_ERROR,
            ServiceError::InitializationFailed(_)
            | ServiceError::CapabilityMissing { .. }
            | ServiceError::Runtime(_) => codes::INTERNAL,
        }
    }

    pub fn to_response(&self) -> MethodResponse {
        MethodResponse::error(self.code(), self.to_string())
    }
}

impl From<BridgeError> for ServiceError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::InvalidArguments(msg) => ServiceError::InvalidArgument(msg),
            other => ServiceError::Playback(other.into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
