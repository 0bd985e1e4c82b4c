//! # Configuration Surface
//!
//! Everything comes from the environment at startup; missing required
//! values fail fast with the variable named. Secrets loaded from secret
//! stores routinely carry trailing whitespace, so every value is trimmed
//! at this boundary once, instead of defensively everywhere else.

use anyhow::{anyhow, Context, Result};
use batch_producer::BatchConfig;
use block_sink::StoreConfig;
use cron::Schedule;
use gap_auditor::AuditConfig;
use std::env;
use std::str::FromStr;
use stream_producer::StreamConfig;

/// Default cron for the hourly batch pass.
pub const DEFAULT_BATCH_CRON: &str = "0 * * * *";

/// Default cron for the three-hourly audit pass.
pub const DEFAULT_AUDIT_CRON: &str = "0 */3 * * *";

/// Full daemon configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Stream producer settings.
    pub stream: StreamConfig,
    /// Batch producer settings.
    pub batch: BatchConfig,
    /// Storage endpoint settings.
    pub store: StoreConfig,
    /// Auditor thresholds.
    pub audit: AuditConfig,
    /// Schedule of the batch pass.
    pub batch_schedule: Schedule,
    /// Schedule of the audit pass.
    pub audit_schedule: Schedule,
    /// Optional watchdog ping destination.
    pub heartbeat_url: Option<String>,
    /// Optional push-alert endpoint.
    pub alert_url: Option<String>,
    /// Bearer token for the alert endpoint.
    pub alert_token: Option<String>,
    /// Drain budget before force exit, in seconds.
    pub shutdown_grace_secs: u64,
}

impl AppConfig {
    /// Load and validate from the environment.
    pub fn from_env() -> Result<Self> {
        let stream = StreamConfig {
            ws_url: required("UPSTREAM_STREAM_URL")?,
            ..StreamConfig::default()
        };

        let batch = BatchConfig {
            credentials: required("WAREHOUSE_CREDENTIALS")?,
            endpoint: optional("WAREHOUSE_ENDPOINT")
                .unwrap_or_else(|| "https://warehouse.googleapis.invalid/query".to_string()),
            dataset: optional("WAREHOUSE_DATASET")
                .unwrap_or_else(|| "bigquery-public-data.crypto_ethereum".to_string()),
            ..BatchConfig::default()
        };

        let store = StoreConfig {
            host: required("STORE_HOST")?,
            user: required("STORE_USER")?,
            password: required("STORE_PASSWORD")?,
            database: optional("STORE_DATABASE").unwrap_or_else(|| "ethereum".to_string()),
            table: optional("STORE_TABLE").unwrap_or_else(|| "blocks".to_string()),
            ..StoreConfig::default()
        };

        let audit = AuditConfig {
            staleness_threshold_secs: parsed_or("STALENESS_THRESHOLD_SECONDS", 960)?,
            gap_grace_secs: parsed_or("GAP_GRACE_SECONDS", 1_800)?,
            ..AuditConfig::default()
        };

        Ok(Self {
            stream,
            batch,
            store,
            audit,
            batch_schedule: parse_cron(
                "SCHEDULE_BATCH_CRON",
                &optional("SCHEDULE_BATCH_CRON").unwrap_or_else(|| DEFAULT_BATCH_CRON.to_string()),
            )?,
            audit_schedule: parse_cron(
                "SCHEDULE_AUDIT_CRON",
                &optional("SCHEDULE_AUDIT_CRON").unwrap_or_else(|| DEFAULT_AUDIT_CRON.to_string()),
            )?,
            heartbeat_url: optional("HEARTBEAT_URL"),
            alert_url: optional("ALERT_URL"),
            alert_token: optional("ALERT_TOKEN"),
            shutdown_grace_secs: parsed_or("SHUTDOWN_GRACE_SECONDS", 30)? as u64,
        })
    }
}

fn required(name: &'static str) -> Result<String> {
    let value = env::var(name)
        .map_err(|_| anyhow!("missing required environment variable {name}"))?
        .trim()
        .to_string();
    if value.is_empty() {
        return Err(anyhow!("environment variable {name} is empty"));
    }
    Ok(value)
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_or(name: &'static str, default: i64) -> Result<i64> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("environment variable {name} is not an integer: `{raw}`")),
    }
}

/// Parse a cron expression, accepting the common 5-field form by
/// prepending a seconds field.
pub fn parse_cron(name: &str, expression: &str) -> Result<Schedule> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized)
        .with_context(|| format!("{name} is not a valid cron expression: `{expression}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Utc};

    #[test]
    fn test_five_field_cron_is_normalized() {
        let schedule = parse_cron("TEST", "0 * * * *").unwrap();
        let next = schedule.after(&Utc::now()).next().unwrap();
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_audit_default_cron_parses() {
        assert!(parse_cron("TEST", DEFAULT_AUDIT_CRON).is_ok());
        assert!(parse_cron("TEST", DEFAULT_BATCH_CRON).is_ok());
    }

    #[test]
    fn test_six_field_cron_passes_through() {
        assert!(parse_cron("TEST", "30 0 * * * *").is_ok());
    }

    #[test]
    fn test_invalid_cron_names_the_variable() {
        let err = parse_cron("SCHEDULE_BATCH_CRON", "not a cron").unwrap_err();
        assert!(err.to_string().contains("SCHEDULE_BATCH_CRON"));
    }

    #[test]
    fn test_required_fails_fast_when_unset() {
        // Use a name no test environment will have.
        let err = required("GAPLESS_SURELY_UNSET_VARIABLE").unwrap_err();
        assert!(err.to_string().contains("GAPLESS_SURELY_UNSET_VARIABLE"));
    }
}
