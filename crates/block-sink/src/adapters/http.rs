//! # HTTP Store Adapter
//!
//! Speaks the columnar store's HTTP dialect: statements go in the `query`
//! parameter, insert payloads in the body as `JSONEachRow` lines, results
//! come back as `JSONEachRow` lines. Reads that need the merged view use
//! `FINAL`; existence scans skip it.

use crate::config::StoreConfig;
use crate::ports::outbound::{BlockStore, Watermarks};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{BlockRecord, IngestError};
use std::time::Duration;
use tracing::{debug, info};

/// Table DDL. Replacing merge keyed by `number` with a server-assigned
/// insert version, monthly partitions over `timestamp`, and a secondary
/// projection ordered by `(timestamp, number)` for date-range scans.
/// Codecs: delta-delta for the monotonic columns, T64 for bounded
/// integers, ZSTD for the wide integers, plain for the sparse blob pair.
const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    number            UInt64 CODEC(DoubleDelta, LZ4),
    timestamp         DateTime64(3, 'UTC') CODEC(DoubleDelta, LZ4),
    gas_limit         UInt64 CODEC(T64, LZ4),
    gas_used          UInt64 CODEC(T64, LZ4),
    base_fee_per_gas  UInt64 CODEC(T64, LZ4),
    transaction_count UInt64 CODEC(T64, LZ4),
    difficulty        UInt256 CODEC(ZSTD(3)),
    total_difficulty  UInt256 CODEC(ZSTD(3)),
    size              UInt64 CODEC(T64, LZ4),
    blob_gas_used     Nullable(UInt64) CODEC(NONE),
    excess_blob_gas   Nullable(UInt64) CODEC(NONE),
    insert_version    UInt64 DEFAULT toUnixTimestamp64Nano(now64(9)),
    PROJECTION by_time (SELECT * ORDER BY (timestamp, number))
)
ENGINE = ReplacingMergeTree(insert_version)
PARTITION BY toYYYYMM(timestamp)
ORDER BY number
"#;

const STORED_COLUMNS: &str = "number, timestamp, gas_limit, gas_used, base_fee_per_gas, \
     transaction_count, difficulty, total_difficulty, size, blob_gas_used, excess_blob_gas";

/// One row on the wire. 64-bit integers travel as JSON numbers (quoting is
/// disabled per query); the 256-bit columns travel as decimal strings and
/// the timestamp in the store's `DateTime64(3)` text form.
#[derive(Debug, Serialize)]
struct RowWire {
    number: u64,
    timestamp: String,
    gas_limit: u64,
    gas_used: u64,
    base_fee_per_gas: u64,
    transaction_count: u64,
    difficulty: String,
    total_difficulty: String,
    size: u64,
    blob_gas_used: Option<u64>,
    excess_blob_gas: Option<u64>,
}

impl From<&BlockRecord> for RowWire {
    fn from(row: &BlockRecord) -> Self {
        Self {
            number: row.number,
            timestamp: row.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            gas_limit: row.gas_limit,
            gas_used: row.gas_used,
            base_fee_per_gas: row.base_fee_per_gas,
            transaction_count: row.transaction_count,
            difficulty: row.difficulty.to_string(),
            total_difficulty: row.total_difficulty.to_string(),
            size: row.size,
            blob_gas_used: row.blob_gas_used,
            excess_blob_gas: row.excess_blob_gas,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TipWire {
    number: u64,
    ts_millis: i64,
}

#[derive(Debug, Deserialize)]
struct WatermarksWire {
    block_count: u64,
    min_number: u64,
    max_number: u64,
}

#[derive(Debug, Deserialize)]
struct NumberWire {
    number: u64,
}

/// Production store client over authenticated TLS.
pub struct HttpBlockStore {
    client: reqwest::Client,
    config: StoreConfig,
}

impl HttpBlockStore {
    /// Build a client for the configured endpoint.
    pub fn new(config: StoreConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.write_timeout_secs))
            .build()
            .map_err(IngestError::transport)?;
        Ok(Self { client, config })
    }

    /// Create the blocks table if it does not exist.
    pub async fn ensure_table(&self) -> Result<(), IngestError> {
        let sql = CREATE_TABLE_SQL.replace("{table}", &self.config.qualified_table());
        self.execute(&sql, None).await?;
        info!("[sink] table {} ready", self.config.qualified_table());
        Ok(())
    }

    /// Run one statement; `body` carries insert payloads.
    async fn execute(&self, sql: &str, body: Option<String>) -> Result<String, IngestError> {
        let mut request = self
            .client
            .post(&self.config.host)
            .query(&[
                ("query", sql),
                ("output_format_json_quote_64bit_integers", "0"),
            ])
            .header("X-ClickHouse-User", &self.config.user)
            .header("X-ClickHouse-Key", &self.config.password);
        if let Some(payload) = body {
            request = request.body(payload);
        }

        let response = request.send().await.map_err(IngestError::transport)?;
        let status = response.status();
        let text = response.text().await.map_err(IngestError::transport)?;

        if status.is_success() {
            return Ok(text);
        }
        if status.as_u16() == 429 || text.contains("QUOTA_EXCEEDED") || text.contains("TOO_MANY") {
            return Err(IngestError::Quota(format!("store refused: {text}")));
        }
        Err(IngestError::Transport(format!(
            "store returned {status}: {text}"
        )))
    }

    fn parse_lines<T: serde::de::DeserializeOwned>(text: &str) -> Result<Vec<T>, IngestError> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    IngestError::Transport(format!("unparseable store response line: {e}"))
                })
            })
            .collect()
    }
}

#[async_trait]
impl BlockStore for HttpBlockStore {
    async fn insert_rows(&self, rows: &[BlockRecord]) -> Result<(), IngestError> {
        let sql = format!(
            "INSERT INTO {} ({STORED_COLUMNS}) FORMAT JSONEachRow",
            self.config.qualified_table()
        );
        let mut payload = String::with_capacity(rows.len() * 160);
        for row in rows {
            let wire = RowWire::from(row);
            payload.push_str(&serde_json::to_string(&wire).map_err(IngestError::transport)?);
            payload.push('\n');
        }
        self.execute(&sql, Some(payload)).await?;
        debug!("[sink] wrote {} rows", rows.len());
        Ok(())
    }

    async fn tip(&self) -> Result<Option<(u64, DateTime<Utc>)>, IngestError> {
        let sql = format!(
            "SELECT number, toUnixTimestamp64Milli(timestamp) AS ts_millis \
             FROM {} FINAL ORDER BY number DESC LIMIT 1 FORMAT JSONEachRow",
            self.config.qualified_table()
        );
        let text = self.execute(&sql, None).await?;
        let rows: Vec<TipWire> = Self::parse_lines(&text)?;
        Ok(rows.into_iter().next().and_then(|tip| {
            Utc.timestamp_millis_opt(tip.ts_millis)
                .single()
                .map(|ts| (tip.number, ts))
        }))
    }

    async fn watermarks(&self) -> Result<Watermarks, IngestError> {
        let sql = format!(
            "SELECT count() AS block_count, min(number) AS min_number, \
             max(number) AS max_number FROM {} FORMAT JSONEachRow",
            self.config.qualified_table()
        );
        let text = self.execute(&sql, None).await?;
        let rows: Vec<WatermarksWire> = Self::parse_lines(&text)?;
        let Some(wire) = rows.into_iter().next() else {
            return Ok(Watermarks {
                block_count: 0,
                min_number: None,
                max_number: None,
            });
        };
        if wire.block_count == 0 {
            return Ok(Watermarks {
                block_count: 0,
                min_number: None,
                max_number: None,
            });
        }
        Ok(Watermarks {
            block_count: wire.block_count,
            min_number: Some(wire.min_number),
            max_number: Some(wire.max_number),
        })
    }

    async fn numbers_in_range(&self, lo: u64, hi: u64) -> Result<Vec<u64>, IngestError> {
        if hi <= lo {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT DISTINCT number FROM {} \
             WHERE number >= {lo} AND number < {hi} ORDER BY number FORMAT JSONEachRow",
            self.config.qualified_table()
        );
        let text = self.execute(&sql, None).await?;
        let rows: Vec<NumberWire> = Self::parse_lines(&text)?;
        Ok(rows.into_iter().map(|row| row.number).collect())
    }

    async fn timestamp_of(&self, number: u64) -> Result<Option<DateTime<Utc>>, IngestError> {
        let sql = format!(
            "SELECT number, toUnixTimestamp64Milli(timestamp) AS ts_millis \
             FROM {} FINAL WHERE number = {number} LIMIT 1 FORMAT JSONEachRow",
            self.config.qualified_table()
        );
        let text = self.execute(&sql, None).await?;
        let rows: Vec<TipWire> = Self::parse_lines(&text)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| Utc.timestamp_millis_opt(row.ts_millis).single()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_block;

    #[test]
    fn test_row_wire_shape() {
        let mut block = sample_block(19_500_000);
        block.blob_gas_used = Some(131_072);
        block.excess_blob_gas = Some(0);

        let wire = RowWire::from(&block);
        let json = serde_json::to_string(&wire).unwrap();

        assert!(json.contains("\"number\":19500000"));
        assert!(json.contains("\"difficulty\":\"0\""));
        assert!(json.contains("\"blob_gas_used\":131072"));
        // DateTime64(3) text form, not ISO-8601.
        assert!(!json.contains('T') || !json.contains("+00:00"));
    }

    #[test]
    fn test_pre_dencun_blob_fields_serialize_null() {
        let block = sample_block(10_000_000);
        let json = serde_json::to_string(&RowWire::from(&block)).unwrap();
        assert!(json.contains("\"blob_gas_used\":null"));
        assert!(json.contains("\"excess_blob_gas\":null"));
    }

    #[test]
    fn test_parse_lines_skips_blanks() {
        let text = "{\"number\":1}\n\n{\"number\":2}\n";
        let rows: Vec<NumberWire> = HttpBlockStore::parse_lines(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].number, 2);
    }

    #[test]
    fn test_ddl_names_every_stored_column() {
        for column in STORED_COLUMNS.split(',') {
            assert!(
                CREATE_TABLE_SQL.contains(column.trim()),
                "DDL missing column {}",
                column.trim()
            );
        }
        assert!(CREATE_TABLE_SQL.contains("ReplacingMergeTree"));
        assert!(CREATE_TABLE_SQL.contains("toYYYYMM(timestamp)"));
    }
}
