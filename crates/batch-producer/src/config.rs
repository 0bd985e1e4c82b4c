//! # Batch Producer Configuration

use serde::{Deserialize, Serialize};

/// Configuration for warehouse catch-up and backfill.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Warehouse query endpoint.
    pub endpoint: String,

    /// Service credentials (bearer token). Trimmed at load time.
    pub credentials: String,

    /// Dataset qualifier for the blocks table.
    pub dataset: String,

    /// Scheduled window height, roughly two hours at the 12 s cadence.
    pub window_blocks: u64,

    /// Rows per warehouse page and per sink submission.
    pub page_rows: u64,

    /// Chunk cap for on-demand ranges; about one year of blocks, which
    /// keeps a worst-case repair under control on memory.
    pub max_chunk_blocks: u64,

    /// Per-chunk query timeout in seconds.
    pub query_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            credentials: String::new(),
            dataset: "ethereum_mainnet".to_string(),
            window_blocks: 600,
            page_rows: 10_000,
            max_chunk_blocks: 2_600_000,
            query_timeout_secs: 300,
        }
    }
}

impl BatchConfig {
    /// Config with small windows for tests.
    pub fn for_testing() -> Self {
        Self {
            endpoint: "http://localhost:0".to_string(),
            credentials: "test".to_string(),
            dataset: "test".to_string(),
            window_blocks: 20,
            page_rows: 16,
            max_chunk_blocks: 100,
            query_timeout_secs: 5,
        }
    }
}
