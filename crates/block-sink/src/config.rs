//! # Store Configuration
//!
//! Connection settings for the columnar storage endpoint.

use serde::{Deserialize, Serialize};

/// Storage endpoint configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// HTTPS endpoint of the store, e.g. `https://store.example.com:8443`.
    pub host: String,

    /// Store user.
    pub user: String,

    /// Store password. Trimmed of surrounding whitespace at load time by
    /// the supervisor's config layer.
    pub password: String,

    /// Database holding the blocks table.
    pub database: String,

    /// Table name.
    pub table: String,

    /// Per-batch write timeout in seconds.
    pub write_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:8123".to_string(),
            user: "default".to_string(),
            password: String::new(),
            database: "ethereum".to_string(),
            table: "blocks".to_string(),
            write_timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    /// Fully qualified table identifier.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_table() {
        let config = StoreConfig::default();
        assert_eq!(config.qualified_table(), "ethereum.blocks");
    }
}
