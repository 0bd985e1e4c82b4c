//! # Stream Producer
//!
//! Keeps the stored tip current with sub-minute latency. A reader task
//! holds a persistent WebSocket subscription to new block headers, fetches
//! each full block over the same connection, and pushes records into a
//! bounded queue; a writer task drains the queue into the sink in
//! micro-batches.
//!
//! The producer survives reorgs (duplicate numbers pass through; the sink's
//! replacing merge resolves them), disconnects (reconnect with backoff,
//! then catch up from the stored tip), and missed notifications (gap-fill
//! fetches between consecutive heads).
//!
//! ## Module Structure
//!
//! ```text
//! stream-producer/
//! ├── state.rs         # Connection state machine
//! ├── rpc.rs           # JSON-RPC wire types, hex decoding
//! ├── ws.rs            # WebSocket session (subscribe, request, keepalive)
//! ├── producer.rs      # Reader/writer tasks
//! └── config.rs        # StreamConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod producer;
pub mod rpc;
pub mod state;
pub mod ws;

pub use config::StreamConfig;
pub use producer::StreamProducer;
pub use state::ProducerState;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
