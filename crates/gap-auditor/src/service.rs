//! # Audit Pass
//!
//! One pass: tip + tip age, gap scan over the recent height range,
//! classification, then the outcome ladder. Healthy passes emit a
//! heartbeat report; degraded passes warn once per transition; persistent
//! gaps get repaired, re-scanned, and alerted if they survive.

use crate::config::AuditConfig;
use crate::domain::{classify_gap, estimate_gap_age, GapClass};
use batch_producer::BatchProducer;
use block_sink::{BlockSink, GapRange};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use shared_bus::{AuditReport, AuditStatus, HealthBus, HealthEvent};
use shared_types::IngestError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Pass-over-pass memory: which gaps we saw, when we last alerted each
/// range, and whether we are inside a degraded episode.
#[derive(Default)]
struct AuditorState {
    previous_gaps: HashSet<GapRange>,
    last_alerted: HashMap<GapRange, DateTime<Utc>>,
    degraded_since: Option<DateTime<Utc>>,
    escalated: bool,
}

/// Scheduled integrity auditor.
pub struct GapAuditor {
    config: AuditConfig,
    sink: Arc<BlockSink>,
    batch: Arc<BatchProducer>,
    bus: Arc<HealthBus>,
    state: Mutex<AuditorState>,
}

impl GapAuditor {
    /// Build an auditor over the shared sink, batch producer, and bus.
    pub fn new(
        config: AuditConfig,
        sink: Arc<BlockSink>,
        batch: Arc<BatchProducer>,
        bus: Arc<HealthBus>,
    ) -> Self {
        Self {
            config,
            sink,
            batch,
            bus,
            state: Mutex::new(AuditorState::default()),
        }
    }

    /// Run one pass at wall-clock `now` and return the report it emitted.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<AuditReport, IngestError> {
        let marks = self.sink.watermarks().await?;
        let Some((tip_number, tip_timestamp)) = self.sink.tip().await? else {
            info!("[audit] store is empty; waiting for the first blocks");
            let report = AuditReport {
                status: AuditStatus::Degraded,
                block_count: 0,
                min_number: None,
                max_number: None,
                tip_age_secs: 0,
                threshold_pct: 0,
                margin_seconds: self.config.staleness_threshold_secs,
                new_gaps: 0,
                persistent_gaps: 0,
                resolved_gaps: 0,
            };
            self.bus.publish(HealthEvent::AuditCompleted(report.clone()));
            return Ok(report);
        };

        let tip_age = now - tip_timestamp;
        // Gaps exist only inside [min_stored, max_stored]; the scan floor
        // never reaches below the first stored block.
        let scan_lo = tip_number
            .saturating_sub(self.config.scan_depth_blocks)
            .max(marks.min_number.unwrap_or(0));
        let gaps = self.sink.scan_gaps(scan_lo, tip_number).await?;

        let mut transient = Vec::new();
        let mut persistent = Vec::new();
        for gap in &gaps {
            let successor = self.sink.timestamp_of(gap.last_missing + 1).await?;
            let age = estimate_gap_age(
                *gap,
                tip_number,
                tip_timestamp,
                successor,
                self.config.block_cadence_secs,
                now,
            );
            match classify_gap(age, self.config.gap_grace_secs) {
                GapClass::Transient => transient.push(*gap),
                GapClass::Persistent => persistent.push(*gap),
            }
        }

        let current: HashSet<GapRange> = gaps.iter().copied().collect();
        let (new_gaps, resolved_gaps) = {
            let state = self.state.lock();
            let new = current.difference(&state.previous_gaps).count() as u64;
            let resolved = state.previous_gaps.difference(&current).count() as u64;
            (new, resolved)
        };

        let stale = tip_age.num_seconds() > self.config.staleness_threshold_secs;
        let status = if !persistent.is_empty() {
            AuditStatus::Critical
        } else if stale || !transient.is_empty() {
            AuditStatus::Degraded
        } else {
            AuditStatus::Healthy
        };

        match status {
            AuditStatus::Critical => {
                self.repair_persistent(&persistent, now).await;
            }
            AuditStatus::Degraded => {
                let reason = if stale {
                    format!("tip age {}s exceeds threshold", tip_age.num_seconds())
                } else {
                    format!("{} transient gap(s) inside the grace window", transient.len())
                };
                self.note_degraded(reason, now);
            }
            AuditStatus::Healthy => self.note_healthy(),
        }

        let tip_age_secs = tip_age.num_seconds();
        let report = AuditReport {
            status,
            block_count: marks.block_count,
            min_number: marks.min_number,
            max_number: marks.max_number,
            tip_age_secs,
            threshold_pct: (tip_age_secs.max(0) * 100 / self.config.staleness_threshold_secs.max(1))
                as u64,
            margin_seconds: self.config.staleness_threshold_secs - tip_age_secs,
            new_gaps,
            persistent_gaps: persistent.len() as u64,
            resolved_gaps,
        };
        info!(
            "[audit] pass done: {:?}, tip {} ({}s old), {} gap(s) ({} persistent, {} new, {} resolved)",
            report.status,
            tip_number,
            report.tip_age_secs,
            gaps.len(),
            report.persistent_gaps,
            report.new_gaps,
            report.resolved_gaps
        );
        self.bus.publish(HealthEvent::AuditCompleted(report.clone()));

        self.state.lock().previous_gaps = current;
        Ok(report)
    }

    /// Backfill each persistent range, confirm by re-scan, and alert what
    /// survives. Alerts are spaced per unique range.
    async fn repair_persistent(&self, persistent: &[GapRange], now: DateTime<Utc>) {
        for gap in persistent {
            let (lo, hi) = gap.repair_bounds();
            let unresolved = match self.batch.repair(lo, hi).await {
                Ok(_) => match self.sink.scan_gaps(lo, hi).await {
                    Ok(remaining) => remaining,
                    Err(e) => {
                        warn!("[audit] re-scan of {} failed: {}", gap, e);
                        vec![*gap]
                    }
                },
                Err(e) => {
                    warn!("[audit] repair of {} failed: {}", gap, e);
                    vec![*gap]
                }
            };

            if unresolved.is_empty() {
                info!("[audit] gap {} repaired and confirmed", gap);
                self.state.lock().last_alerted.remove(gap);
                continue;
            }

            for remaining in unresolved {
                let should_alert = {
                    let mut state = self.state.lock();
                    let due = state
                        .last_alerted
                        .get(&remaining)
                        .map_or(true, |last| {
                            now - *last >= Duration::seconds(self.config.alert_interval_secs)
                        });
                    if due {
                        state.last_alerted.insert(remaining, now);
                    }
                    due
                };
                if should_alert {
                    warn!("[audit] gap {} persists after repair", remaining);
                    self.bus.publish(HealthEvent::CriticalGap {
                        first_missing: remaining.first_missing,
                        last_missing: remaining.last_missing,
                        detail: format!("gap {remaining} persists after targeted backfill"),
                    });
                }
            }
        }
    }

    /// Warn once on entering a degraded episode; escalate once if it
    /// lasts past the escalation window.
    fn note_degraded(&self, reason: String, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        match state.degraded_since {
            None => {
                state.degraded_since = Some(now);
                state.escalated = false;
                drop(state);
                warn!("[audit] degraded: {}", reason);
                self.bus.publish(HealthEvent::Degraded { reason });
            }
            Some(since) => {
                let long_running =
                    now - since >= Duration::seconds(self.config.degraded_escalation_secs);
                if long_running && !state.escalated {
                    state.escalated = true;
                    drop(state);
                    warn!("[audit] still degraded after an hour: {}", reason);
                    self.bus.publish(HealthEvent::Degraded {
                        reason: format!("degraded for over an hour: {reason}"),
                    });
                }
            }
        }
    }

    fn note_healthy(&self) {
        let mut state = self.state.lock();
        if state.degraded_since.take().is_some() {
            state.escalated = false;
            drop(state);
            info!("[audit] recovered");
            self.bus.publish(HealthEvent::Recovered);
        }
    }
}
