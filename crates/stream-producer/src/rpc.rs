//! # JSON-RPC Wire Types
//!
//! Requests, responses, and the block payloads the upstream endpoint
//! returns. Numeric fields arrive as hex-quantity strings and are decoded
//! here; a payload that fails to decode is schema drift and surfaces as a
//! validation error naming the field.

use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use shared_types::entities::timestamp_from_unix;
use shared_types::{BlockRecord, IngestError, MERGE_BLOCK};

/// Terminal total difficulty; clients that no longer report the frozen
/// `totalDifficulty` for post-merge blocks get this value substituted.
pub fn final_total_difficulty() -> U256 {
    U256::from(58_750_003_716_598_352_816_469u128)
}

/// Outgoing JSON-RPC request.
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Method name.
    pub method: &'static str,
    /// Positional parameters.
    pub params: serde_json::Value,
    /// Correlation id.
    pub id: u64,
}

impl RpcRequest {
    /// Build a request with the given correlation id.
    pub fn new(method: &'static str, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// Error body inside a JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    /// Server-assigned error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// Notification payload of a head subscription.
#[derive(Debug, Deserialize)]
pub struct SubscriptionParams {
    /// Subscription this notification belongs to.
    pub subscription: String,
    /// The notification body (a header summary).
    pub result: serde_json::Value,
}

/// Any incoming frame: response, notification, or error.
#[derive(Debug, Deserialize)]
pub struct Incoming {
    /// Correlation id for responses.
    pub id: Option<u64>,
    /// Response payload.
    pub result: Option<serde_json::Value>,
    /// Error payload.
    pub error: Option<RpcErrorBody>,
    /// `eth_subscription` for notifications.
    pub method: Option<String>,
    /// Notification parameters.
    pub params: Option<SubscriptionParams>,
}

/// Header summary from a new-heads notification. Only the number is used;
/// the full block is fetched separately because the notification carries no
/// transaction list.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHead {
    /// Hex-quantity block number.
    pub number: String,
}

impl RawHead {
    /// Decode the block number.
    pub fn block_number(&self) -> Result<u64, IngestError> {
        parse_hex_u64("number", &self.number)
    }
}

/// Full block payload from `eth_getBlockByNumber` with bodies included.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    /// Hex-quantity block number.
    pub number: String,
    /// Hex-quantity Unix timestamp (seconds).
    pub timestamp: String,
    /// Hex-quantity gas limit.
    pub gas_limit: String,
    /// Hex-quantity gas used.
    pub gas_used: String,
    /// Hex-quantity base fee; absent pre-London.
    pub base_fee_per_gas: Option<String>,
    /// Hex-quantity difficulty; zero post-merge.
    pub difficulty: Option<String>,
    /// Hex-quantity total difficulty; some clients omit it post-merge.
    pub total_difficulty: Option<String>,
    /// Hex-quantity block size in bytes.
    pub size: String,
    /// Hex-quantity blob gas used; absent pre-Dencun.
    pub blob_gas_used: Option<String>,
    /// Hex-quantity excess blob gas; absent pre-Dencun.
    pub excess_blob_gas: Option<String>,
    /// Transaction objects; only the count is stored.
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
}

impl RawBlock {
    /// Convert the wire payload into the stored record.
    pub fn into_record(self) -> Result<BlockRecord, IngestError> {
        let number = parse_hex_u64("number", &self.number)?;
        let total_difficulty = match self.total_difficulty.as_deref() {
            Some(raw) => parse_hex_u256("total_difficulty", raw)?,
            None if number >= MERGE_BLOCK => final_total_difficulty(),
            None => {
                return Err(IngestError::Validation {
                    field: "total_difficulty".to_string(),
                    reason: format!("missing at pre-merge block {number}"),
                })
            }
        };
        Ok(BlockRecord {
            number,
            timestamp: parse_hex_timestamp("timestamp", &self.timestamp)?,
            gas_limit: parse_hex_u64("gas_limit", &self.gas_limit)?,
            gas_used: parse_hex_u64("gas_used", &self.gas_used)?,
            base_fee_per_gas: self
                .base_fee_per_gas
                .as_deref()
                .map(|raw| parse_hex_u64("base_fee_per_gas", raw))
                .transpose()?
                .unwrap_or(0),
            transaction_count: self.transactions.len() as u64,
            difficulty: self
                .difficulty
                .as_deref()
                .map(|raw| parse_hex_u256("difficulty", raw))
                .transpose()?
                .unwrap_or_default(),
            total_difficulty,
            size: parse_hex_u64("size", &self.size)?,
            blob_gas_used: self
                .blob_gas_used
                .as_deref()
                .map(|raw| parse_hex_u64("blob_gas_used", raw))
                .transpose()?,
            excess_blob_gas: self
                .excess_blob_gas
                .as_deref()
                .map(|raw| parse_hex_u64("excess_blob_gas", raw))
                .transpose()?,
        })
    }
}

/// Decode a `0x`-prefixed hex quantity into a `u64`.
pub fn parse_hex_u64(field: &'static str, raw: &str) -> Result<u64, IngestError> {
    let stripped = raw.trim_start_matches("0x");
    u64::from_str_radix(stripped, 16).map_err(|_| IngestError::Validation {
        field: field.to_string(),
        reason: format!("`{raw}` is not a hex quantity"),
    })
}

/// Decode a `0x`-prefixed hex quantity into a `U256`.
pub fn parse_hex_u256(field: &'static str, raw: &str) -> Result<U256, IngestError> {
    let stripped = raw.trim_start_matches("0x");
    U256::from_str_radix(stripped, 16).map_err(|_| IngestError::Validation {
        field: field.to_string(),
        reason: format!("`{raw}` is not a hex quantity"),
    })
}

fn parse_hex_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, IngestError> {
    Ok(timestamp_from_unix(parse_hex_u64(field, raw)?))
}
