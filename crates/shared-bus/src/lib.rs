//! # Shared Bus - Health Event Bus
//!
//! In-process fan-out channel carrying health signals from the producers and
//! the auditor to the supervisor, which routes them outward (heartbeat pings,
//! alerts, logs).
//!
//! ```text
//! ┌────────────────┐                     ┌──────────────┐
//! │ StreamProducer │── StreamTick ──┐    │  Supervisor  │
//! └────────────────┘                │    │ (heartbeat,  │
//! ┌────────────────┐                ▼    │  alerts)     │
//! │ BatchProducer  │── reports ─► HealthBus ────────────►
//! └────────────────┘                ▲    └──────────────┘
//! ┌────────────────┐                │
//! │ GapAuditor     │── audit ───────┘
//! └────────────────┘
//! ```
//!
//! Components never call each other for health reporting; they publish here
//! and the supervisor subscribes. Slow subscribers lag and skip rather than
//! backpressure the producers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{AuditReport, AuditStatus, BatchRunReport, HealthEvent, Severity};
pub use publisher::HealthBus;
pub use subscriber::Subscription;

/// Maximum events buffered per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
