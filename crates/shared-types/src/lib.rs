//! # Shared Types
//!
//! Core types used across every ingestion subsystem:
//!
//! - [`BlockRecord`]: the canonical unit of storage (one Ethereum mainnet
//!   block header projected to the 11 stored columns).
//! - [`IngestError`]: the tagged error taxonomy every operation returns.
//! - [`RetryPolicy`] / [`retry_with_backoff`]: the single shared retry
//!   primitive used by every external call site.
//!
//! No subsystem defines its own ad-hoc error enum or backoff loop; they all
//! go through this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entities;
pub mod errors;
pub mod retry;

pub use entities::{BlockRecord, FieldViolation, DENCUN_BLOCK, LONDON_BLOCK, MERGE_BLOCK};
pub use errors::IngestError;
pub use retry::{retry_with_backoff, RetryPolicy};

/// Receiving half of the process-wide shutdown signal.
///
/// The supervisor owns the sending half; `true` means "drain and exit".
/// Every task checks this at each suspension point.
pub type ShutdownSignal = tokio::sync::watch::Receiver<bool>;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
