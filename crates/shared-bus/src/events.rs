//! # Health Events
//!
//! Everything that flows over the bus. Events are serializable so the
//! supervisor can forward them to the alert channel verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one scheduled batch pass or repair run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRunReport {
    /// Rows written through the sink during the run.
    pub blocks_written: u64,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
    /// Lowest block number covered, if any rows were written.
    pub min_number: Option<u64>,
    /// Highest block number covered, if any rows were written.
    pub max_number: Option<u64>,
}

/// Overall verdict of one audit pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    /// No persistent gaps and the tip is fresh.
    Healthy,
    /// Stale tip or transient gaps; expected to self-heal.
    Degraded,
    /// At least one persistent gap survived targeted repair.
    Critical,
}

/// Heartbeat payload emitted after every audit pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Verdict of the pass.
    pub status: AuditStatus,
    /// Total stored rows (unmerged count is fine for trend monitoring).
    pub block_count: u64,
    /// Lowest stored block number.
    pub min_number: Option<u64>,
    /// Highest stored block number.
    pub max_number: Option<u64>,
    /// Age of the stored tip in seconds.
    pub tip_age_secs: i64,
    /// Tip age as a percentage of the staleness threshold.
    pub threshold_pct: u64,
    /// Seconds of headroom left before the staleness threshold.
    pub margin_seconds: i64,
    /// Gap ranges first seen this pass.
    pub new_gaps: u64,
    /// Gap ranges older than the grace window.
    pub persistent_gaps: u64,
    /// Gap ranges present last pass and gone now.
    pub resolved_gaps: u64,
}

/// Alert severity, mirrored into the outbound alert payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine heartbeat information.
    Info,
    /// Degradation expected to self-heal.
    Warning,
    /// Operator intervention required.
    Critical,
}

/// All events that can be published to the health bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthEvent {
    /// The stream writer committed a micro-batch; carries the highest block
    /// number of the batch. Bumps the supervisor's liveness counter.
    StreamTick {
        /// Highest block number in the committed micro-batch.
        number: u64,
        /// Timestamp of that block.
        timestamp: DateTime<Utc>,
    },

    /// The stream producer moved between connection states.
    StreamStateChanged {
        /// Human-readable state name.
        state: String,
    },

    /// A scheduled batch pass or repair run finished.
    BatchRunCompleted(BatchRunReport),

    /// A batch run aborted (quota, exhausted retries).
    BatchRunFailed {
        /// Why the run stopped.
        reason: String,
    },

    /// An audit pass finished; the supervisor turns Healthy reports into
    /// heartbeat pings and Degraded/Critical ones into alerts.
    AuditCompleted(AuditReport),

    /// Transition into degraded operation (stale tip or transient gaps).
    /// Emitted once per transition, not once per pass.
    Degraded {
        /// What degraded.
        reason: String,
    },

    /// Recovery from a degraded period.
    Recovered,

    /// A component hit a fault it cannot recover locally (validation
    /// failure, exhausted retries, task panic). The supervisor translates
    /// these into alerts.
    ProducerFault {
        /// Component name, e.g. `stream-producer`.
        component: String,
        /// What went wrong.
        detail: String,
    },

    /// A gap survived targeted repair; operator attention needed.
    CriticalGap {
        /// First missing block number.
        first_missing: u64,
        /// Last missing block number.
        last_missing: u64,
        /// Context for the operator.
        detail: String,
    },
}

impl HealthEvent {
    /// Severity this event maps to on the outbound alert channel.
    pub fn severity(&self) -> Severity {
        match self {
            HealthEvent::StreamTick { .. }
            | HealthEvent::StreamStateChanged { .. }
            | HealthEvent::BatchRunCompleted(_)
            | HealthEvent::Recovered => Severity::Info,
            HealthEvent::BatchRunFailed { .. } | HealthEvent::Degraded { .. } => Severity::Warning,
            HealthEvent::AuditCompleted(report) => match report.status {
                AuditStatus::Healthy => Severity::Info,
                AuditStatus::Degraded => Severity::Warning,
                AuditStatus::Critical => Severity::Critical,
            },
            HealthEvent::ProducerFault { .. } | HealthEvent::CriticalGap { .. } => {
                Severity::Critical
            }
        }
    }
}
