//! # In-Memory Store
//!
//! A versioned map with the same replacing-merge contract as the production
//! store: rows sharing a `number` collapse to the highest insert version.
//! The merged view is always visible, which makes it a faithful stand-in
//! for post-compaction reads in tests.

use crate::ports::outbound::{BlockStore, Watermarks};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared_types::{BlockRecord, IngestError};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory replacing-merge store.
#[derive(Default)]
pub struct InMemoryBlockStore {
    rows: RwLock<BTreeMap<u64, (u64, BlockRecord)>>,
    insert_version: AtomicU64,
}

impl InMemoryBlockStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merged view of one number.
    pub fn get(&self, number: u64) -> Option<BlockRecord> {
        self.rows.read().get(&number).map(|(_, row)| row.clone())
    }

    /// Distinct numbers stored.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Test hook: drop a row, as if data had been lost upstream. The
    /// system itself never deletes.
    pub fn remove(&self, number: u64) -> Option<BlockRecord> {
        self.rows.write().remove(&number).map(|(_, row)| row)
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn insert_rows(&self, rows: &[BlockRecord]) -> Result<(), IngestError> {
        let mut table = self.rows.write();
        for row in rows {
            let version = self.insert_version.fetch_add(1, Ordering::SeqCst);
            match table.get(&row.number) {
                Some((stored_version, _)) if *stored_version > version => {}
                _ => {
                    table.insert(row.number, (version, row.clone()));
                }
            }
        }
        Ok(())
    }

    async fn tip(&self) -> Result<Option<(u64, DateTime<Utc>)>, IngestError> {
        Ok(self
            .rows
            .read()
            .iter()
            .next_back()
            .map(|(number, (_, row))| (*number, row.timestamp)))
    }

    async fn watermarks(&self) -> Result<Watermarks, IngestError> {
        let table = self.rows.read();
        Ok(Watermarks {
            block_count: table.len() as u64,
            min_number: table.keys().next().copied(),
            max_number: table.keys().next_back().copied(),
        })
    }

    async fn numbers_in_range(&self, lo: u64, hi: u64) -> Result<Vec<u64>, IngestError> {
        if hi <= lo {
            return Ok(Vec::new());
        }
        Ok(self
            .rows
            .read()
            .range((Bound::Included(lo), Bound::Excluded(hi)))
            .map(|(number, _)| *number)
            .collect())
    }

    async fn timestamp_of(&self, number: u64) -> Result<Option<DateTime<Utc>>, IngestError> {
        Ok(self
            .rows
            .read()
            .get(&number)
            .map(|(_, row)| row.timestamp))
    }
}
