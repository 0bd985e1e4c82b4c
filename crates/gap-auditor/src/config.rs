//! # Auditor Configuration

use serde::{Deserialize, Serialize};

/// Configuration for the audit pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Tip age beyond which the system is degraded. 80 block intervals:
    /// larger than any normal chain pause, well under the batch cadence.
    pub staleness_threshold_secs: i64,

    /// Minimum estimated age before a gap counts as persistent.
    pub gap_grace_secs: i64,

    /// How far below the tip each pass scans; older history was verified
    /// by earlier passes.
    pub scan_depth_blocks: u64,

    /// Nominal block cadence used to estimate the age of missing blocks.
    pub block_cadence_secs: u64,

    /// Minimum spacing of critical alerts per unique gap range.
    pub alert_interval_secs: i64,

    /// How long a degraded episode may last before it is escalated.
    pub degraded_escalation_secs: i64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_secs: 960,
            gap_grace_secs: 1_800,
            scan_depth_blocks: 2_600_000,
            block_cadence_secs: 12,
            alert_interval_secs: 3_600,
            degraded_escalation_secs: 3_600,
        }
    }
}
