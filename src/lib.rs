//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-service`, `core-playback`). Host applications can
//! depend on `cached-video-workspace` and enable the documented features
//! without wiring each crate individually.
//!
//! - `desktop-shims` (default): full channel layer with the reqwest-backed
//!   desktop bridge injected automatically.
//! - `playback-only`: just the cache, data-source and session core.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;

#[cfg(feature = "playback-only")]
pub use core_playback as playback;
