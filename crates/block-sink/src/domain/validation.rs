//! # Validation Pipeline
//!
//! Applied in order before any batch reaches the transport:
//!
//! 1. batch bounds (non-empty, at most [`MAX_BATCH_ROWS`])
//! 2. per-row field predicates
//! 3. intra-batch dedup on `number`, keeping the last occurrence
//!
//! Any failing row aborts the whole batch naming the offending field. There
//! are no partial silent drops; a rejected batch writes nothing.

use shared_types::{BlockRecord, IngestError};
use std::collections::HashMap;

/// Upper bound on rows per upsert call.
pub const MAX_BATCH_ROWS: usize = 50_000;

/// Validate and dedupe a batch, returning the rows to submit.
///
/// The returned vector preserves first-seen order; a duplicate `number`
/// overwrites the earlier row in place, so the last submitted version wins
/// even before the store's merge does.
pub fn validate_batch(batch: Vec<BlockRecord>) -> Result<Vec<BlockRecord>, IngestError> {
    if batch.is_empty() {
        return Err(IngestError::Validation {
            field: "batch".to_string(),
            reason: "empty batch".to_string(),
        });
    }
    if batch.len() > MAX_BATCH_ROWS {
        return Err(IngestError::Validation {
            field: "batch".to_string(),
            reason: format!("{} rows exceeds limit of {}", batch.len(), MAX_BATCH_ROWS),
        });
    }

    for row in &batch {
        row.check()?;
    }

    let mut slot_by_number: HashMap<u64, usize> = HashMap::with_capacity(batch.len());
    let mut deduped: Vec<BlockRecord> = Vec::with_capacity(batch.len());
    for row in batch {
        match slot_by_number.get(&row.number) {
            Some(&slot) => deduped[slot] = row,
            None => {
                slot_by_number.insert(row.number, deduped.len());
                deduped.push(row);
            }
        }
    }
    Ok(deduped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_block;

    #[test]
    fn test_empty_batch_rejected() {
        let result = validate_batch(vec![]);
        assert!(matches!(
            result,
            Err(IngestError::Validation { field, .. }) if field == "batch"
        ));
    }

    #[test]
    fn test_oversize_batch_rejected() {
        let batch: Vec<_> = (0..=MAX_BATCH_ROWS as u64).map(sample_block).collect();
        assert!(validate_batch(batch).is_err());
    }

    #[test]
    fn test_batch_at_limit_accepted() {
        let batch: Vec<_> = (0..MAX_BATCH_ROWS as u64).map(sample_block).collect();
        assert_eq!(validate_batch(batch).unwrap().len(), MAX_BATCH_ROWS);
    }

    #[test]
    fn test_bad_row_aborts_whole_batch() {
        let mut bad = sample_block(101);
        bad.gas_used = bad.gas_limit + 1;
        let batch = vec![sample_block(100), bad, sample_block(102)];

        let result = validate_batch(batch);
        assert!(matches!(
            result,
            Err(IngestError::Validation { field, .. }) if field == "gas_used"
        ));
    }

    #[test]
    fn test_duplicate_numbers_keep_last() {
        let mut first = sample_block(500);
        first.gas_used = 1_000_000;
        let mut second = sample_block(500);
        second.gas_used = 2_000_000;

        let deduped = validate_batch(vec![first, sample_block(501), second]).unwrap();
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].number, 500);
        assert_eq!(deduped[0].gas_used, 2_000_000);
        assert_eq!(deduped[1].number, 501);
    }

    #[test]
    fn test_unsorted_batch_accepted() {
        let batch = vec![sample_block(30), sample_block(10), sample_block(20)];
        assert_eq!(validate_batch(batch).unwrap().len(), 3);
    }
}
