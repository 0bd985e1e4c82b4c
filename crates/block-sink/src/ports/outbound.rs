//! Outbound ports (driven side)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{BlockRecord, IngestError};

/// Aggregate view of what is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Watermarks {
    /// Row count; may exceed distinct numbers before compaction.
    pub block_count: u64,
    /// Lowest stored number.
    pub min_number: Option<u64>,
    /// Highest stored number.
    pub max_number: Option<u64>,
}

/// Port: the columnar store behind the sink.
///
/// Implementations must provide replacing-merge semantics per `number`:
/// after compaction, the latest inserted row for a number is the one reads
/// observe. `insert_rows` is all-or-nothing at the visibility level; on
/// error the caller retries the whole batch.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Append rows. Rows sharing a `number` with earlier inserts supersede
    /// them at merge time.
    async fn insert_rows(&self, rows: &[BlockRecord]) -> Result<(), IngestError>;

    /// Highest stored number and its (merged) timestamp, or `None` when
    /// the table is empty.
    async fn tip(&self) -> Result<Option<(u64, DateTime<Utc>)>, IngestError>;

    /// Count and number bounds.
    async fn watermarks(&self) -> Result<Watermarks, IngestError>;

    /// Sorted distinct numbers present in the half-open interval `[lo, hi)`.
    ///
    /// Existence-only read; implementations may skip the merge.
    async fn numbers_in_range(&self, lo: u64, hi: u64) -> Result<Vec<u64>, IngestError>;

    /// Merged timestamp of one number, if stored.
    async fn timestamp_of(&self, number: u64) -> Result<Option<DateTime<Utc>>, IngestError>;
}
