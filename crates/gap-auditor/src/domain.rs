//! # Gap Classification
//!
//! A gap's age is the age of its highest missing block. When the block
//! just above the gap is stored, its timestamp bounds the gap's age from
//! below (the missing block is older than its successor). Otherwise the
//! age is extrapolated from the tip at the nominal cadence.

use block_sink::GapRange;
use chrono::{DateTime, Duration, Utc};

/// How a gap is treated by the pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapClass {
    /// Young enough that a producer may still fill it; do nothing.
    Transient,
    /// Both producers had their shot; backfill it.
    Persistent,
}

/// Estimated age of the highest missing block in `gap`.
pub fn estimate_gap_age(
    gap: GapRange,
    tip_number: u64,
    tip_timestamp: DateTime<Utc>,
    successor_timestamp: Option<DateTime<Utc>>,
    cadence_secs: u64,
    now: DateTime<Utc>,
) -> Duration {
    let estimated = match successor_timestamp {
        Some(ts) => ts,
        None => {
            let blocks_below_tip = tip_number.saturating_sub(gap.last_missing);
            tip_timestamp - Duration::seconds((blocks_below_tip * cadence_secs) as i64)
        }
    };
    now - estimated
}

/// Classify by the grace window.
pub fn classify_gap(age: Duration, grace_secs: i64) -> GapClass {
    if age > Duration::seconds(grace_secs) {
        GapClass::Persistent
    } else {
        GapClass::Transient
    }
}
