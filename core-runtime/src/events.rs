//! # Event Bus System
//!
//! Typed diagnostics events for the video cache core, published through a
//! `tokio::sync::broadcast` channel.
//!
//! ## Overview
//!
//! - **Event Types**: [`PlaybackEvent`], [`PrefetchEvent`], [`CacheEvent`]
//!   wrapped in [`CoreEvent`]
//! - **EventBus**: central broadcast channel; cloning it shares the channel
//! - **Subscriptions**: any number of independent receivers
//!
//! The bus is an observability side channel. The first-frame notification a
//! view relies on is delivered through its own callback, not through the bus,
//! and prefetch failures stay invisible to the prefetch caller even though
//! they are published here.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PrefetchEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Prefetch(PrefetchEvent::Completed {
//!     task_id: "42".to_string(),
//!     cached_bytes: 1024,
//! }));
//!
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Prefetch(_))));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Slow subscribers get `RecvError::Lagged(n)` and can keep receiving;
//! `RecvError::Closed` means every bus handle was dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Playback(PlaybackEvent),
    Prefetch(PrefetchEvent),
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &'static str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Prefetch(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }
}

/// Events emitted by playback sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// A new media item was assigned; `cache_key` is the stable key.
    DataSourceSet {
        session_id: String,
        cache_key: String,
    },
    /// First video frame rendered in the current prepare cycle.
    FirstFrame { session_id: String, cycle: u64 },
    /// Engine state transition.
    StateChanged {
        session_id: String,
        from: String,
        to: String,
    },
    /// Engine instance released.
    Released { session_id: String },
}

impl PlaybackEvent {
    pub fn description(&self) -> &'static str {
        match self {
            PlaybackEvent::DataSourceSet { .. } => "Data source assigned",
            PlaybackEvent::FirstFrame { .. } => "First frame rendered",
            PlaybackEvent::StateChanged { .. } => "Playback state changed",
            PlaybackEvent::Released { .. } => "Engine released",
        }
    }
}

/// Events emitted by head prefetch tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PrefetchEvent {
    Started {
        task_id: String,
        cache_key: String,
        requested_bytes: u64,
    },
    Progress {
        task_id: String,
        cached_bytes: u64,
        requested_bytes: u64,
    },
    Completed {
        task_id: String,
        cached_bytes: u64,
    },
    Cancelled {
        task_id: String,
    },
    /// Never reported to the prefetch caller; diagnostics only.
    Failed {
        task_id: String,
        message: String,
    },
}

impl PrefetchEvent {
    pub fn description(&self) -> &'static str {
        match self {
            PrefetchEvent::Started { .. } => "Prefetch started",
            PrefetchEvent::Progress { .. } => "Prefetch progress",
            PrefetchEvent::Completed { .. } => "Prefetch completed",
            PrefetchEvent::Cancelled { .. } => "Prefetch cancelled",
            PrefetchEvent::Failed { .. } => "Prefetch failed",
        }
    }
}

/// Events emitted by the disk cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    Initialized {
        directory: String,
        entries: usize,
        total_bytes: u64,
    },
    Evicted {
        cache_key: String,
        bytes: u64,
    },
}

impl CacheEvent {
    pub fn description(&self) -> &'static str {
        match self {
            CacheEvent::Initialized { .. } => "Cache initialized",
            CacheEvent::Evicted { .. } => "Cache entry evicted",
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event; returns the number of subscribers reached.
    ///
    /// Having no subscribers is normal and yields `0`.
    pub fn emit(&self, event: CoreEvent) -> usize {
        trace!(event = event.description(), "Publishing event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
