//! # Sink Service
//!
//! Orchestrates the write path: validate, dedupe, then hand the batch to
//! the store under the write lock. Retrying is the caller's job; a failed
//! upsert has no partial visibility guarantee and must be resubmitted
//! whole.

use crate::domain::gaps::{gaps_in_scan, GapRange};
use crate::domain::validation::validate_batch;
use crate::ports::outbound::{BlockStore, Watermarks};
use chrono::{DateTime, Utc};
use shared_types::{BlockRecord, IngestError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Acknowledgement of a durable upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpsertAck {
    /// Rows submitted to the store after in-batch dedup.
    pub rows_written: u64,
    /// Rows dropped by in-batch dedup (same number, earlier occurrence).
    pub deduped: u64,
}

/// The single write path into the columnar store.
///
/// Cheap to share behind an `Arc`; both producers call it concurrently and
/// the internal lock serializes transport calls on the one connection.
pub struct BlockSink {
    store: Arc<dyn BlockStore>,
    write_serial: Mutex<()>,
}

impl BlockSink {
    /// Wrap a store.
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self {
            store,
            write_serial: Mutex::new(()),
        }
    }

    /// Validate and durably record a batch.
    ///
    /// On success every row is visible to later reads (modulo merge
    /// timing for duplicate numbers). On error nothing is guaranteed
    /// visible and the caller retries the whole batch.
    pub async fn upsert_blocks(&self, batch: Vec<BlockRecord>) -> Result<UpsertAck, IngestError> {
        let submitted = batch.len();
        let rows = validate_batch(batch)?;
        let deduped = (submitted - rows.len()) as u64;

        let _guard = self.write_serial.lock().await;
        self.store.insert_rows(&rows).await?;
        debug!(
            "[sink] upserted {} rows ({} deduped in batch)",
            rows.len(),
            deduped
        );
        Ok(UpsertAck {
            rows_written: rows.len() as u64,
            deduped,
        })
    }

    /// Highest stored block and its timestamp; `None` on an empty store.
    pub async fn tip(&self) -> Result<Option<(u64, DateTime<Utc>)>, IngestError> {
        self.store.tip().await
    }

    /// Count and number bounds of the store.
    pub async fn watermarks(&self) -> Result<Watermarks, IngestError> {
        self.store.watermarks().await
    }

    /// Missing-number ranges within the half-open interval `[lo, hi)`.
    pub async fn scan_gaps(&self, lo: u64, hi: u64) -> Result<Vec<GapRange>, IngestError> {
        let present = self.store.numbers_in_range(lo, hi).await?;
        Ok(gaps_in_scan(lo, hi, &present))
    }

    /// Merged timestamp of one stored block, if present.
    pub async fn timestamp_of(&self, number: u64) -> Result<Option<DateTime<Utc>>, IngestError> {
        self.store.timestamp_of(number).await
    }
}
