//! # Health Routing
//!
//! Subscribes to the health bus and routes outward: stream ticks and
//! completed audit passes become watchdog heartbeats, warnings and
//! critical events become alert posts. Both channels are optional and
//! best-effort; a failed delivery is logged, never retried, and never
//! blocks ingestion.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_bus::{HealthEvent, Severity, Subscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Liveness counters reported on every heartbeat.
#[derive(Default)]
pub struct LivenessCounters {
    stream_ticks: AtomicU64,
    last_write_millis: AtomicU64,
}

impl LivenessCounters {
    /// Record one committed stream micro-batch.
    pub fn record_tick(&self, at: DateTime<Utc>) {
        self.stream_ticks.fetch_add(1, Ordering::Relaxed);
        self.last_write_millis
            .store(at.timestamp_millis().max(0) as u64, Ordering::Relaxed);
    }

    /// Total stream ticks since startup.
    pub fn ticks(&self) -> u64 {
        self.stream_ticks.load(Ordering::Relaxed)
    }

    /// Timestamp of the last committed write, if any.
    pub fn last_write(&self) -> Option<u64> {
        match self.last_write_millis.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(millis),
        }
    }
}

/// Heartbeat body sent to the watchdog.
#[derive(Debug, Serialize)]
struct HeartbeatPayload {
    tip_number: Option<u64>,
    tip_age_secs: Option<i64>,
    stream_ticks: u64,
    last_write_millis: Option<u64>,
}

/// Alert body posted to the alert channel.
#[derive(Debug, Serialize)]
struct AlertPayload {
    severity: Severity,
    title: String,
    detail: String,
}

/// Outbound health client: watchdog pings and alert posts.
pub struct HealthReporter {
    client: reqwest::Client,
    heartbeat_url: Option<String>,
    alert_url: Option<String>,
    alert_token: Option<String>,
    counters: Arc<LivenessCounters>,
}

impl HealthReporter {
    /// Build a reporter; `None` urls disable the respective channel.
    pub fn new(
        heartbeat_url: Option<String>,
        alert_url: Option<String>,
        alert_token: Option<String>,
        counters: Arc<LivenessCounters>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            heartbeat_url,
            alert_url,
            alert_token,
            counters,
        }
    }

    async fn heartbeat(&self, tip_number: Option<u64>, tip_age_secs: Option<i64>) {
        let Some(url) = &self.heartbeat_url else {
            return;
        };
        let payload = HeartbeatPayload {
            tip_number,
            tip_age_secs,
            stream_ticks: self.counters.ticks(),
            last_write_millis: self.counters.last_write(),
        };
        match self.client.get(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("[ingestd] heartbeat delivered");
            }
            Ok(response) => warn!("[ingestd] heartbeat rejected: {}", response.status()),
            Err(e) => warn!("[ingestd] heartbeat failed: {}", e),
        }
    }

    async fn alert(&self, severity: Severity, title: &str, detail: String) {
        let Some(url) = &self.alert_url else {
            info!("[ingestd] alert ({:?}) {}: {}", severity, title, detail);
            return;
        };
        let payload = AlertPayload {
            severity,
            title: title.to_string(),
            detail,
        };
        let mut request = self.client.post(url).json(&payload);
        if let Some(token) = &self.alert_token {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!("[ingestd] alert delivered: {}", title);
            }
            Ok(response) => warn!("[ingestd] alert rejected: {}", response.status()),
            Err(e) => warn!("[ingestd] alert failed: {}", e),
        }
    }
}

/// Drain the bus until it closes, translating events into outbound calls.
pub async fn route_events(mut subscription: Subscription, reporter: HealthReporter) {
    while let Some(event) = subscription.recv().await {
        match event {
            HealthEvent::StreamTick { number, timestamp } => {
                reporter.counters.record_tick(Utc::now());
                let age = (Utc::now() - timestamp).num_seconds();
                reporter.heartbeat(Some(number), Some(age)).await;
            }
            HealthEvent::AuditCompleted(report) => {
                reporter
                    .heartbeat(report.max_number, Some(report.tip_age_secs))
                    .await;
            }
            HealthEvent::Degraded { reason } => {
                reporter
                    .alert(Severity::Warning, "ingestion degraded", reason)
                    .await;
            }
            HealthEvent::BatchRunFailed { reason } => {
                reporter
                    .alert(Severity::Warning, "batch run failed", reason)
                    .await;
            }
            HealthEvent::CriticalGap {
                first_missing,
                last_missing,
                detail,
            } => {
                reporter
                    .alert(
                        Severity::Critical,
                        "unresolved block gap",
                        format!("blocks [{first_missing}, {last_missing}]: {detail}"),
                    )
                    .await;
            }
            HealthEvent::ProducerFault { component, detail } => {
                reporter
                    .alert(
                        Severity::Critical,
                        "producer fault",
                        format!("{component}: {detail}"),
                    )
                    .await;
            }
            HealthEvent::Recovered => {
                info!("[ingestd] ingestion recovered");
            }
            HealthEvent::StreamStateChanged { state } => {
                debug!("[ingestd] stream state: {}", state);
            }
            HealthEvent::BatchRunCompleted(report) => {
                info!(
                    "[ingestd] batch run: {} blocks [{:?}, {:?}] in {} ms",
                    report.blocks_written, report.min_number, report.max_number, report.duration_ms
                );
            }
        }
    }
}
