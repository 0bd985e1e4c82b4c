//! # Stream Producer Configuration

use serde::{Deserialize, Serialize};

/// Configuration for the live subscription pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamConfig {
    /// WebSocket endpoint with embedded auth, e.g.
    /// `wss://mainnet.example.io/v2/<key>`.
    pub ws_url: String,

    /// Bounded queue between reader and writer, in blocks.
    pub queue_capacity: usize,

    /// Micro-batch size cap for sink writes.
    pub micro_batch_max: usize,

    /// Micro-batch time window in milliseconds; a partial batch flushes
    /// when the window closes.
    pub micro_batch_window_ms: u64,

    /// Keepalive ping interval in seconds.
    pub ping_interval_secs: u64,

    /// Deadline for the pong after a keepalive ping.
    pub pong_timeout_secs: u64,

    /// Per-attempt timeout for a single-block fetch.
    pub fetch_timeout_secs: u64,

    /// How long the reader may block on a full queue before it drops the
    /// connection to shed load.
    pub enqueue_stall_secs: u64,

    /// Budget for flushing the queue on shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            queue_capacity: 1_024,
            micro_batch_max: 100,
            micro_batch_window_ms: 500,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            fetch_timeout_secs: 10,
            enqueue_stall_secs: 30,
            drain_timeout_secs: 5,
        }
    }
}

impl StreamConfig {
    /// Config with short windows for tests.
    pub fn for_testing(ws_url: String) -> Self {
        Self {
            ws_url,
            queue_capacity: 16,
            micro_batch_max: 4,
            micro_batch_window_ms: 50,
            ping_interval_secs: 5,
            pong_timeout_secs: 2,
            fetch_timeout_secs: 2,
            enqueue_stall_secs: 1,
            drain_timeout_secs: 2,
        }
    }
}
