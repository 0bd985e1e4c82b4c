//! # Publisher
//!
//! The bus handle shared by every component. Cheap to clone behind an `Arc`;
//! publishing never blocks and never fails, even with zero subscribers.

use crate::events::HealthEvent;
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// In-memory health bus backed by `tokio::sync::broadcast`.
///
/// Multi-producer, multi-consumer; a subscriber that falls behind skips
/// events rather than stalling publishers.
pub struct HealthBus {
    sender: broadcast::Sender<HealthEvent>,
    events_published: AtomicU64,
}

impl HealthBus {
    /// Create a bus with the default per-subscriber buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with a specific per-subscriber buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
        }
    }

    /// Publish an event; returns how many subscribers received it.
    pub fn publish(&self, event: HealthEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                // No live subscribers; health signals are best-effort.
                debug!("health event dropped: no subscribers");
                0
            }
        }
    }

    /// Open a new subscription starting at the current event.
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.sender.subscribe())
    }

    /// Total events published since startup.
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl Default for HealthBus {
    fn default() -> Self {
        Self::new()
    }
}
