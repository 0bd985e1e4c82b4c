//! # Gap Auditor
//!
//! Reconciles the store against the chain invariants on a schedule. A pass
//! computes the tip age, scans the recent height range for holes, and
//! classifies each hole by age: young gaps are transient (a producer may
//! just be catching up), old gaps are persistent and trigger targeted
//! backfill through the batch producer. A gap that survives its repair is
//! alerted for operator intervention.
//!
//! ## Module Structure
//!
//! ```text
//! gap-auditor/
//! ├── domain.rs        # Gap aging, classification, pass-over-pass diffing
//! ├── service.rs       # The audit pass and repair orchestration
//! └── config.rs        # AuditConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod service;

pub use config::AuditConfig;
pub use domain::{classify_gap, estimate_gap_age, GapClass};
pub use service::GapAuditor;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
