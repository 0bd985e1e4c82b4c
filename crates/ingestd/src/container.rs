//! # Wiring
//!
//! Builds the object graph in dependency order: store adapter, sink,
//! warehouse adapter, producers, auditor. Everything shares one health bus
//! and one shutdown signal owned here.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use batch_producer::{BatchProducer, HttpWarehouse, Warehouse};
use block_sink::{BlockSink, BlockStore, HttpBlockStore};
use gap_auditor::GapAuditor;
use shared_bus::HealthBus;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// The wired process, ready to run.
pub struct Subsystems {
    /// Shared health bus.
    pub bus: Arc<HealthBus>,
    /// The single write path.
    pub sink: Arc<BlockSink>,
    /// Batch producer, shared with the auditor for repair.
    pub batch: Arc<BatchProducer>,
    /// The auditor.
    pub auditor: Arc<GapAuditor>,
    /// Shutdown broadcast; send `true` to drain and exit.
    pub shutdown_tx: watch::Sender<bool>,
    /// Receiving half handed to every task.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Wire everything against the production adapters.
pub async fn build(config: &AppConfig) -> Result<Subsystems> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bus = Arc::new(HealthBus::new());

    let store = Arc::new(
        HttpBlockStore::new(config.store.clone()).context("building store client")?,
    );
    // Best effort: the store may still be coming up; writes retry anyway.
    if let Err(e) = store.ensure_table().await {
        warn!("[ingestd] could not ensure blocks table yet: {}", e);
    }
    let sink = Arc::new(BlockSink::new(Arc::clone(&store) as Arc<dyn BlockStore>));

    let warehouse = Arc::new(
        HttpWarehouse::new(config.batch.clone()).context("building warehouse client")?,
    );
    let batch = Arc::new(BatchProducer::new(
        config.batch.clone(),
        warehouse as Arc<dyn Warehouse>,
        Arc::clone(&sink),
        Arc::clone(&bus),
        shutdown_rx.clone(),
    ));

    let auditor = Arc::new(GapAuditor::new(
        config.audit.clone(),
        Arc::clone(&sink),
        Arc::clone(&batch),
        Arc::clone(&bus),
    ));

    Ok(Subsystems {
        bus,
        sink,
        batch,
        auditor,
        shutdown_tx,
        shutdown_rx,
    })
}
