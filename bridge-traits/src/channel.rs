//! Message channel boundary towards the application shell.
//!
//! The shell talks to the native layer through named channels. Each call is a
//! [`MethodCall`] answered by exactly one [`MethodResponse`]; events flow the
//! other way through an [`EventSink`] without a reply.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Name of the instance-independent channel.
pub const PLUGIN_CHANNEL: &str = "cached_video_player";

/// View type under which per-view surfaces are registered.
pub const VIEW_TYPE: &str = "cached_video_player/view";

/// Channel name of the view with the given identifier.
pub fn view_channel_name(view_id: i64) -> String {
    format!("{}/view_{}", PLUGIN_CHANNEL, view_id)
}

/// Incoming request on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// Call without arguments.
    pub fn bare(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }

    /// Decode the arguments map into a typed struct.
    ///
    /// A `null` argument payload decodes like an empty map so that
    /// all-optional argument structs accept bare calls.
    pub fn arguments<T: DeserializeOwned>(&self) -> Result<T> {
        let args = match &self.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(args).map_err(|e| {
            BridgeError::InvalidArguments(format!("{}: {}", self.method, e))
        })
    }
}

/// Reply to a [`MethodCall`].
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Error {
        code: String,
        message: String,
        details: Option<Value>,
    },
    NotImplemented,
}

impl MethodResponse {
    /// Successful reply carrying `null`.
    pub fn ok() -> Self {
        MethodResponse::Success(Value::Null)
    }

    pub fn success(value: impl Into<Value>) -> Self {
        MethodResponse::Success(value.into())
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        MethodResponse::Error {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success(_))
    }

    /// Error code, if this is an error reply.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            MethodResponse::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Fire-and-forget event channel towards the shell.
///
/// Hosts typically forward to `invokeMethod` on the platform channel named
/// `channel`. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, channel: &str, event: &str, payload: Value) -> Result<()>;
}
