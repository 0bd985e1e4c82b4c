//! Outbound ports (driven side)

use async_trait::async_trait;
use shared_types::{BlockRecord, IngestError};

/// Port: the historical warehouse.
///
/// Callers keep `fetch_range` intervals at page size or below; the
/// implementation is free to stream internally but returns one page of
/// fully decoded records.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Highest block number the warehouse has, or `None` if it is empty.
    async fn max_block_number(&self) -> Result<Option<u64>, IngestError>;

    /// All blocks in the half-open interval `[lo, hi)`, ascending.
    async fn fetch_range(&self, lo: u64, hi: u64) -> Result<Vec<BlockRecord>, IngestError>;
}
