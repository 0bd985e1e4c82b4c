//! # Telemetry
//!
//! Logging bootstrap for the ingestion daemon. One call at startup wires the
//! `tracing` subscriber with an env-filter and either human-readable or JSON
//! output.
//!
//! ```rust,ignore
//! use telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // spans and events now flow to stdout
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;

pub use config::TelemetryConfig;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The level filter string did not parse.
    #[error("invalid log filter `{0}`")]
    InvalidFilter(String),

    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Guard that keeps telemetry active; hold it for the process lifetime.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global tracing subscriber.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|_| TelemetryError::InvalidFilter(config.log_level.clone()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let install_result = if config.json_logs {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.try_init()
    };

    install_result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(service = %config.service_name, "telemetry initialized");
    Ok(TelemetryGuard { _private: () })
}
