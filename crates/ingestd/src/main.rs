//! # Ingestd
//!
//! Entry point for the ingestion daemon. Two concurrent producers feed one
//! idempotent sink; a scheduled auditor closes their failure modes.

use anyhow::Result;
use ingestd::{supervisor, AppConfig};
use telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_telemetry(TelemetryConfig::from_env())?;

    info!("===========================================");
    info!("  ingestd v{}", ingestd::VERSION);
    info!("===========================================");

    let config = AppConfig::from_env()?;
    supervisor::run(config).await
}
