//! # Domain Entities
//!
//! The canonical block record and the mainnet fork heights that shape its
//! field constraints.

use chrono::{DateTime, TimeZone, Utc};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// First block with a `base_fee_per_gas` (London / EIP-1559).
pub const LONDON_BLOCK: u64 = 12_965_000;

/// First proof-of-stake block; `difficulty` is zero from here on and
/// `total_difficulty` is frozen.
pub const MERGE_BLOCK: u64 = 15_537_394;

/// First block carrying blob-gas fields (Dencun / EIP-4844).
pub const DENCUN_BLOCK: u64 = 19_426_587;

/// One Ethereum mainnet block, projected to the 11 stored columns.
///
/// `number` is the sole identity key. Two records with equal `number` are
/// resolved to the latest writer by the storage layer's replacing merge.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockRecord {
    /// Block height; strictly monotonic across the chain.
    pub number: u64,
    /// Block timestamp, millisecond precision, UTC.
    pub timestamp: DateTime<Utc>,
    /// Gas limit of the block.
    pub gas_limit: u64,
    /// Gas actually consumed; never exceeds `gas_limit`.
    pub gas_used: u64,
    /// Base fee in wei; zero before [`LONDON_BLOCK`].
    pub base_fee_per_gas: u64,
    /// Number of transactions in the block body.
    pub transaction_count: u64,
    /// Proof-of-work difficulty; zero from [`MERGE_BLOCK`] on.
    pub difficulty: U256,
    /// Cumulative chain difficulty; frozen from [`MERGE_BLOCK`] on.
    pub total_difficulty: U256,
    /// Block size in bytes.
    pub size: u64,
    /// Blob gas used; `None` before [`DENCUN_BLOCK`].
    pub blob_gas_used: Option<u64>,
    /// Excess blob gas; `None` before [`DENCUN_BLOCK`].
    pub excess_blob_gas: Option<u64>,
}

/// A named per-row constraint violation.
///
/// Carries the offending field so a bad batch can be rejected with a
/// message that points at the producer bug, not just "invalid row".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    /// Column name of the violated constraint.
    pub field: &'static str,
    /// Human-readable description of the violation.
    pub reason: String,
}

impl BlockRecord {
    /// Check the per-row field constraints.
    ///
    /// Unsigned types make the non-negativity constraints structural; what
    /// remains are the cross-field and fork-conditional predicates:
    ///
    /// - `gas_used <= gas_limit`
    /// - `difficulty == 0` from the Merge on
    /// - blob-gas fields null before Dencun, present after
    pub fn check(&self) -> Result<(), FieldViolation> {
        if self.gas_used > self.gas_limit {
            return Err(FieldViolation {
                field: "gas_used",
                reason: format!(
                    "gas_used {} exceeds gas_limit {} at block {}",
                    self.gas_used, self.gas_limit, self.number
                ),
            });
        }
        if self.number >= MERGE_BLOCK && !self.difficulty.is_zero() {
            return Err(FieldViolation {
                field: "difficulty",
                reason: format!(
                    "non-zero difficulty {} at post-merge block {}",
                    self.difficulty, self.number
                ),
            });
        }
        if self.number < DENCUN_BLOCK {
            if self.blob_gas_used.is_some() || self.excess_blob_gas.is_some() {
                return Err(FieldViolation {
                    field: "blob_gas_used",
                    reason: format!("blob gas fields set at pre-Dencun block {}", self.number),
                });
            }
        } else if self.blob_gas_used.is_none() || self.excess_blob_gas.is_none() {
            return Err(FieldViolation {
                field: "blob_gas_used",
                reason: format!("blob gas fields missing at post-Dencun block {}", self.number),
            });
        }
        Ok(())
    }

    /// Seconds-precision Unix timestamp of the block.
    pub fn unix_timestamp(&self) -> u64 {
        self.timestamp.timestamp().max(0) as u64
    }
}

/// Convert a header's Unix timestamp (seconds) into the stored UTC instant.
pub fn timestamp_from_unix(secs: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pre_merge_block(number: u64) -> BlockRecord {
        BlockRecord {
            number,
            timestamp: timestamp_from_unix(1_600_000_000),
            gas_limit: 30_000_000,
            gas_used: 12_000_000,
            base_fee_per_gas: 0,
            transaction_count: 150,
            difficulty: U256::from(7_000_000_000_000_000u64),
            total_difficulty: U256::from(50_000_000_000_000_000u64),
            size: 60_000,
            blob_gas_used: None,
            excess_blob_gas: None,
        }
    }

    fn post_dencun_block(number: u64) -> BlockRecord {
        BlockRecord {
            number,
            timestamp: timestamp_from_unix(1_720_000_000),
            gas_limit: 30_000_000,
            gas_used: 14_000_000,
            base_fee_per_gas: 8_000_000_000,
            transaction_count: 200,
            difficulty: U256::zero(),
            total_difficulty: U256::from(58_750_003_716_598_352_816_469u128),
            size: 90_000,
            blob_gas_used: Some(393_216),
            excess_blob_gas: Some(0),
        }
    }

    #[test]
    fn test_valid_rows_pass() {
        assert!(pre_merge_block(10_000_000).check().is_ok());
        assert!(post_dencun_block(19_500_000).check().is_ok());
    }

    #[test]
    fn test_gas_used_at_limit_is_accepted() {
        let mut block = pre_merge_block(10_000_000);
        block.gas_used = block.gas_limit;
        assert!(block.check().is_ok());
    }

    #[test]
    fn test_gas_used_over_limit_rejected() {
        let mut block = pre_merge_block(10_000_000);
        block.gas_used = block.gas_limit + 1;
        let violation = block.check().unwrap_err();
        assert_eq!(violation.field, "gas_used");
    }

    #[test]
    fn test_post_merge_difficulty_must_be_zero() {
        let mut block = pre_merge_block(MERGE_BLOCK);
        block.blob_gas_used = None;
        block.excess_blob_gas = None;
        let violation = block.check().unwrap_err();
        assert_eq!(violation.field, "difficulty");
    }

    #[test]
    fn test_blob_fields_rejected_before_dencun() {
        let mut block = pre_merge_block(10_000_000);
        block.blob_gas_used = Some(0);
        assert!(block.check().is_err());
    }

    #[test]
    fn test_blob_fields_required_after_dencun() {
        let mut block = post_dencun_block(DENCUN_BLOCK);
        block.excess_blob_gas = None;
        assert!(block.check().is_err());
    }

    #[test]
    fn test_genesis_block_is_valid() {
        let mut block = pre_merge_block(0);
        block.difficulty = U256::from(17_179_869_184u64);
        assert!(block.check().is_ok());
    }

    #[test]
    fn test_serde_round_trip() {
        let block = post_dencun_block(19_500_000);
        let json = serde_json::to_string(&block).unwrap();
        let back: BlockRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(block, back);
    }
}
