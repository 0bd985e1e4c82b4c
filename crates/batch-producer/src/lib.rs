//! # Batch Producer
//!
//! Pulls recent history from the analytical warehouse on a schedule and
//! backfills explicit ranges on demand for the auditor. Everything funnels
//! through one range pipeline: split oversized ranges into bounded chunks,
//! page each chunk, fetch with retry, and write through the sink.
//!
//! The warehouse projection covers exactly the 11 stored columns, which
//! keeps each scheduled run far under the scan quota.
//!
//! ## Module Structure
//!
//! ```text
//! batch-producer/
//! ├── ports/           # Warehouse trait (outbound)
//! ├── adapters/        # SQL-over-HTTP warehouse client
//! ├── service.rs       # Scheduled pass + targeted repair
//! ├── test_utils.rs    # Deterministic mock warehouse
//! └── config.rs        # BatchConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod ports;
pub mod service;
pub mod test_utils;

pub use adapters::http::HttpWarehouse;
pub use config::BatchConfig;
pub use ports::outbound::Warehouse;
pub use service::BatchProducer;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
