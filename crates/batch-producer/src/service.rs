//! # Batch Service
//!
//! The scheduled pass covers the trailing window behind the warehouse's
//! max block; repair covers whatever range the auditor asks for. Both run
//! the same pipeline: chunk, page, fetch with bounded retry, upsert.
//!
//! Failure split: a warehouse quota aborts the run (the next scheduled
//! pass catches up), a sink quota pauses and resumes, exhausted transport
//! retries abort the run with a warning.

use crate::config::BatchConfig;
use crate::ports::outbound::Warehouse;
use block_sink::BlockSink;
use shared_bus::{BatchRunReport, HealthBus, HealthEvent};
use shared_types::{retry_with_backoff, IngestError, RetryPolicy, ShutdownSignal};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Pause applied when the store answers with a quota rejection.
const SINK_QUOTA_PAUSE: Duration = Duration::from_secs(300);

/// Periodic catch-up and targeted backfill.
pub struct BatchProducer {
    config: BatchConfig,
    warehouse: Arc<dyn Warehouse>,
    sink: Arc<BlockSink>,
    bus: Arc<HealthBus>,
    shutdown: ShutdownSignal,
}

impl BatchProducer {
    /// Build a producer over the shared sink and bus.
    pub fn new(
        config: BatchConfig,
        warehouse: Arc<dyn Warehouse>,
        sink: Arc<BlockSink>,
        bus: Arc<HealthBus>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            warehouse,
            sink,
            bus,
            shutdown,
        }
    }

    /// Scheduled pass: refresh the trailing window behind the warehouse
    /// max block.
    pub async fn scheduled_pass(&self) -> Result<BatchRunReport, IngestError> {
        let max = match self.warehouse_max().await? {
            Some(max) => max,
            None => {
                info!("[batch] warehouse is empty; nothing to do");
                let report = BatchRunReport {
                    blocks_written: 0,
                    duration_ms: 0,
                    min_number: None,
                    max_number: None,
                };
                self.bus
                    .publish(HealthEvent::BatchRunCompleted(report.clone()));
                return Ok(report);
            }
        };
        let lo = max.saturating_sub(self.config.window_blocks);
        info!("[batch] scheduled pass over [{}, {}]", lo, max);
        self.run_range(lo, max + 1).await
    }

    /// Targeted backfill of the half-open interval `[lo, hi)`.
    pub async fn repair(&self, lo: u64, hi: u64) -> Result<BatchRunReport, IngestError> {
        info!("[batch] repair requested for [{}, {})", lo, hi);
        self.run_range(lo, hi).await
    }

    async fn warehouse_max(&self) -> Result<Option<u64>, IngestError> {
        let warehouse = Arc::clone(&self.warehouse);
        let result = retry_with_backoff(
            RetryPolicy::warehouse_chunk(),
            self.shutdown.clone(),
            "warehouse max block",
            move || {
                let warehouse = Arc::clone(&warehouse);
                async move { warehouse.max_block_number().await }
            },
        )
        .await;
        match result {
            Err(e) => {
                self.report_failure(&e);
                Err(e)
            }
            ok => ok,
        }
    }

    /// The shared pipeline: chunk to bound memory, page to bound each
    /// query, write pages straight through.
    async fn run_range(&self, lo: u64, hi: u64) -> Result<BatchRunReport, IngestError> {
        let started = Instant::now();
        let mut blocks_written = 0u64;
        let mut min_number: Option<u64> = None;
        let mut max_number: Option<u64> = None;

        let mut chunk_lo = lo;
        while chunk_lo < hi {
            let chunk_hi = hi.min(chunk_lo + self.config.max_chunk_blocks);

            let mut page_lo = chunk_lo;
            while page_lo < chunk_hi {
                if *self.shutdown.borrow() {
                    return Err(IngestError::Canceled);
                }
                let page_hi = chunk_hi.min(page_lo + self.config.page_rows);

                let rows = match self.fetch_page(page_lo, page_hi).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        self.report_failure(&e);
                        return Err(e);
                    }
                };

                if !rows.is_empty() {
                    let page_min = rows.first().map(|row| row.number);
                    let page_max = rows.last().map(|row| row.number);
                    match self.write_rows(rows).await {
                        Ok(written) => {
                            blocks_written += written;
                            min_number = match (min_number, page_min) {
                                (Some(current), Some(page)) => Some(current.min(page)),
                                (current, page) => current.or(page),
                            };
                            max_number = max_number.max(page_max);
                        }
                        Err(e) => {
                            self.report_failure(&e);
                            return Err(e);
                        }
                    }
                }
                page_lo = page_hi;
            }
            chunk_lo = chunk_hi;
        }

        let report = BatchRunReport {
            blocks_written,
            duration_ms: started.elapsed().as_millis() as u64,
            min_number,
            max_number,
        };
        info!(
            "[batch] run complete: {} blocks in {} ms",
            report.blocks_written, report.duration_ms
        );
        self.bus
            .publish(HealthEvent::BatchRunCompleted(report.clone()));
        Ok(report)
    }

    async fn fetch_page(&self, lo: u64, hi: u64) -> Result<Vec<shared_types::BlockRecord>, IngestError> {
        let warehouse = Arc::clone(&self.warehouse);
        retry_with_backoff(
            RetryPolicy::warehouse_chunk(),
            self.shutdown.clone(),
            "warehouse fetch",
            move || {
                let warehouse = Arc::clone(&warehouse);
                async move { warehouse.fetch_range(lo, hi).await }
            },
        )
        .await
    }

    async fn write_rows(&self, rows: Vec<shared_types::BlockRecord>) -> Result<u64, IngestError> {
        let written = rows.len() as u64;
        loop {
            let template = rows.clone();
            let sink = Arc::clone(&self.sink);
            let result = retry_with_backoff(
                RetryPolicy::sink_transport(),
                self.shutdown.clone(),
                "batch sink upsert",
                move || {
                    let sink = Arc::clone(&sink);
                    let batch = template.clone();
                    async move { sink.upsert_blocks(batch).await.map(|_| ()) }
                },
            )
            .await;

            match result {
                Ok(()) => return Ok(written),
                Err(IngestError::Quota(reason)) => {
                    warn!(
                        "[batch] store quota hit ({}); pausing {:?}",
                        reason, SINK_QUOTA_PAUSE
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(SINK_QUOTA_PAUSE) => {}
                        _ = wait_for_shutdown(self.shutdown.clone()) => {
                            return Err(IngestError::Canceled);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn report_failure(&self, error: &IngestError) {
        if matches!(error, IngestError::Canceled) {
            return;
        }
        warn!("[batch] run aborted: {}", error);
        self.bus.publish(HealthEvent::BatchRunFailed {
            reason: error.to_string(),
        });
    }
}

async fn wait_for_shutdown(mut signal: ShutdownSignal) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}
