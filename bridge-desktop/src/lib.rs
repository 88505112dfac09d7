//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts (macOS, Windows,
//! Linux) and for running the core in integration tests.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with the connect/read timeouts and redirect
//!   policy from [`HttpSettings`](bridge_traits::HttpSettings)
//! - `ImageLoader` on top of any `HttpClient`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use bridge_traits::HttpSettings;
//!
//! let http_client = ReqwestHttpClient::new(HttpSettings::default())?;
//! ```

mod http;
mod image;

pub use http::ReqwestHttpClient;
pub use image::HttpImageLoader;
