//! # Core Runtime Module
//!
//! Provides the ambient runtime infrastructure for the video cache core:
//! - Logging and tracing infrastructure
//! - Player configuration
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the playback and service
//! crates depend on. It establishes logging conventions (including redaction
//! of signed URLs), validated configuration with platform defaults, and the
//! broadcast channel used for diagnostics events.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
