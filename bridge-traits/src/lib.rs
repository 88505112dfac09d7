//! # Host Bridge Traits
//!
//! Platform abstraction traits implemented by each host (Android, iOS, desktop).
//!
//! ## Overview
//!
//! This crate defines the contract between the video cache core and the
//! platform it is embedded in. The core never talks to a vendor SDK or an OS
//! API directly; it goes through one of these traits instead.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Ranged, streaming HTTP GET with fixed timeouts
//!
//! ### Application shell boundary
//! - [`MethodCall`](channel::MethodCall) / [`MethodResponse`](channel::MethodResponse) -
//!   request/response messages exchanged on a named channel
//! - [`EventSink`](channel::EventSink) - fire-and-forget events towards the shell
//! - [`ImageLoader`](image::ImageLoader) - cover-art fetching
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to Logcat/OSLog
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | Android  | host glue           | 📋 Planned |
//! | iOS      | host glue           | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep the URL or status code in
//! the message.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`: the prefetch path calls into the HTTP
//! client from background tasks while playback uses it from the UI-bound queue.

pub mod channel;
pub mod error;
pub mod http;
pub mod image;
pub mod logging;

pub use error::BridgeError;

// Re-export commonly used types
pub use channel::{EventSink, MethodCall, MethodResponse};
pub use http::{
    strip_query, ByteRange, ByteStream, HttpClient, HttpRequest, HttpResponseStream, HttpSettings,
};
pub use image::ImageLoader;
pub use logging::{LogEntry, LogLevel, LoggerSink};
