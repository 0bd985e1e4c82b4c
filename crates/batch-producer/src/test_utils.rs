//! # Test Utilities
//!
//! A deterministic in-memory warehouse serving the same synthetic chain as
//! the sink's sample builders, with a scriptable failure queue.

use crate::ports::outbound::Warehouse;
use async_trait::async_trait;
use block_sink::test_utils::sample_block;
use parking_lot::{Mutex, RwLock};
use shared_types::{BlockRecord, IngestError};
use std::collections::VecDeque;

/// Mock warehouse holding the canonical chain `[0, chain_tip]`.
pub struct MockWarehouse {
    chain_tip: RwLock<Option<u64>>,
    script: Mutex<VecDeque<IngestError>>,
    fetch_calls: Mutex<Vec<(u64, u64)>>,
}

impl MockWarehouse {
    /// Warehouse holding blocks `0..=chain_tip`.
    pub fn with_tip(chain_tip: u64) -> Self {
        Self {
            chain_tip: RwLock::new(Some(chain_tip)),
            script: Mutex::new(VecDeque::new()),
            fetch_calls: Mutex::new(Vec::new()),
        }
    }

    /// An empty warehouse.
    pub fn empty() -> Self {
        Self {
            chain_tip: RwLock::new(None),
            script: Mutex::new(VecDeque::new()),
            fetch_calls: Mutex::new(Vec::new()),
        }
    }

    /// Advance (or rewind) the canonical tip.
    pub fn set_tip(&self, chain_tip: u64) {
        *self.chain_tip.write() = Some(chain_tip);
    }

    /// Queue an error for the next `fetch_range` call.
    pub fn fail_next(&self, error: IngestError) {
        self.script.lock().push_back(error);
    }

    /// Ranges requested so far, for asserting pagination.
    pub fn fetch_calls(&self) -> Vec<(u64, u64)> {
        self.fetch_calls.lock().clone()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn max_block_number(&self) -> Result<Option<u64>, IngestError> {
        Ok(*self.chain_tip.read())
    }

    async fn fetch_range(&self, lo: u64, hi: u64) -> Result<Vec<BlockRecord>, IngestError> {
        self.fetch_calls.lock().push((lo, hi));
        if let Some(error) = self.script.lock().pop_front() {
            return Err(error);
        }
        let Some(tip) = *self.chain_tip.read() else {
            return Ok(Vec::new());
        };
        let hi = hi.min(tip + 1);
        if hi <= lo {
            return Ok(Vec::new());
        }
        Ok((lo..hi).map(sample_block).collect())
    }
}
