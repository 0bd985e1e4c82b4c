//! # Test Utilities
//!
//! Deterministic sample blocks and a scriptable flaky store, shared by this
//! crate's tests and by the workspace test suite.

use crate::ports::outbound::{BlockStore, Watermarks};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use primitive_types::U256;
use shared_types::entities::timestamp_from_unix;
use shared_types::{BlockRecord, IngestError, DENCUN_BLOCK, LONDON_BLOCK, MERGE_BLOCK};
use std::collections::VecDeque;
use std::sync::Arc;

/// Unix timestamp of mainnet block 0.
pub const GENESIS_UNIX: u64 = 1_438_269_973;

/// Nominal seconds per block used to synthesize timestamps.
pub const BLOCK_CADENCE_SECS: u64 = 12;

/// A canonical-looking block for `number`, with fork-correct fields.
///
/// Deterministic: the same number always yields the same record, so tests
/// can compare across producers.
pub fn sample_block(number: u64) -> BlockRecord {
    let (difficulty, total_difficulty) = if number >= MERGE_BLOCK {
        (U256::zero(), U256::from(58_750_003_716_598_352_816_469u128))
    } else {
        (
            U256::from(2_000_000_000_000_000u64),
            U256::from(1_000_000_000_000_000u64) * U256::from(number + 1),
        )
    };
    let (blob_gas_used, excess_blob_gas) = if number >= DENCUN_BLOCK {
        (Some((number % 7) * 131_072), Some(0))
    } else {
        (None, None)
    };
    BlockRecord {
        number,
        timestamp: sample_timestamp(number),
        gas_limit: 30_000_000,
        gas_used: 10_000_000 + (number % 1000) * 10_000,
        base_fee_per_gas: if number >= LONDON_BLOCK {
            10_000_000_000 + (number % 100) * 100_000_000
        } else {
            0
        },
        transaction_count: 100 + number % 150,
        difficulty,
        total_difficulty,
        size: 50_000 + (number % 500) * 100,
        blob_gas_used,
        excess_blob_gas,
    }
}

/// The timestamp [`sample_block`] assigns to `number`.
pub fn sample_timestamp(number: u64) -> DateTime<Utc> {
    timestamp_from_unix(GENESIS_UNIX + number * BLOCK_CADENCE_SECS)
}

/// Sample blocks for the half-open interval `[lo, hi)`.
pub fn sample_range(lo: u64, hi: u64) -> Vec<BlockRecord> {
    (lo..hi).map(sample_block).collect()
}

/// Store wrapper that fails scripted calls before delegating.
///
/// Push errors with [`FlakyStore::fail_next`]; each `insert_rows` call pops
/// one scripted error until the script is empty, then writes go through.
pub struct FlakyStore {
    inner: Arc<dyn BlockStore>,
    script: Mutex<VecDeque<IngestError>>,
}

impl FlakyStore {
    /// Wrap a store with an empty failure script.
    pub fn new(inner: Arc<dyn BlockStore>) -> Self {
        Self {
            inner,
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue an error for the next unscripted insert.
    pub fn fail_next(&self, error: IngestError) {
        self.script.lock().push_back(error);
    }

    /// Remaining scripted failures.
    pub fn pending_failures(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl BlockStore for FlakyStore {
    async fn insert_rows(&self, rows: &[BlockRecord]) -> Result<(), IngestError> {
        if let Some(error) = self.script.lock().pop_front() {
            return Err(error);
        }
        self.inner.insert_rows(rows).await
    }

    async fn tip(&self) -> Result<Option<(u64, DateTime<Utc>)>, IngestError> {
        self.inner.tip().await
    }

    async fn watermarks(&self) -> Result<Watermarks, IngestError> {
        self.inner.watermarks().await
    }

    async fn numbers_in_range(&self, lo: u64, hi: u64) -> Result<Vec<u64>, IngestError> {
        self.inner.numbers_in_range(lo, hi).await
    }

    async fn timestamp_of(&self, number: u64) -> Result<Option<DateTime<Utc>>, IngestError> {
        self.inner.timestamp_of(number).await
    }
}
