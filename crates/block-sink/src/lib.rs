//! # Block Sink
//!
//! The single write path into the columnar store, with idempotent per-block
//! semantics. Both producers call [`BlockSink::upsert_blocks`] concurrently;
//! the sink validates, dedupes within the batch, and serializes the actual
//! transport call. Duplicate numbers across batches are resolved by the
//! store's replacing merge: the latest writer wins.
//!
//! ## Module Structure
//!
//! ```text
//! block-sink/
//! ├── domain/          # Validation pipeline, gap-range extraction
//! ├── ports/           # BlockStore trait (outbound)
//! ├── adapters/        # ClickHouse-dialect HTTP store, in-memory store
//! ├── service.rs       # BlockSink orchestrating validation + writes
//! └── config.rs        # StoreConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod test_utils;

pub use adapters::http::HttpBlockStore;
pub use adapters::memory::InMemoryBlockStore;
pub use config::StoreConfig;
pub use domain::gaps::GapRange;
pub use domain::validation::MAX_BATCH_ROWS;
pub use ports::outbound::{BlockStore, Watermarks};
pub use service::{BlockSink, UpsertAck};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
