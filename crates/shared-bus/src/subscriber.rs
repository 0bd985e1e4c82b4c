//! # Subscriber
//!
//! Receiving side of the bus. Wraps the raw broadcast receiver so lag is
//! handled in one place: a slow subscriber skips the overwritten events,
//! records how many it lost, and keeps going.

use crate::events::HealthEvent;
use tokio::sync::broadcast;
use tracing::warn;

/// A live subscription to the health bus.
pub struct Subscription {
    receiver: broadcast::Receiver<HealthEvent>,
    skipped: u64,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<HealthEvent>) -> Self {
        Self {
            receiver,
            skipped: 0,
        }
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the bus is dropped and the buffer is drained.
    /// Lagging skips ahead instead of failing.
    pub async fn recv(&mut self) -> Option<HealthEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    self.skipped += missed;
                    warn!("health subscriber lagged, skipped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` when no event is queued.
    pub fn try_recv(&mut self) -> Option<HealthEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    self.skipped += missed;
                }
                Err(_) => return None,
            }
        }
    }

    /// Events lost to lag over the subscription's lifetime.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
