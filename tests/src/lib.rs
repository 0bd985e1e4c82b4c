//! # Gapless Test Suite
//!
//! Unified test crate for cross-subsystem scenarios:
//!
//! ```text
//! tests/src/
//! ├── support/          # Fake upstream node, polling helpers
//! └── integration/      # End-to-end ingestion scenarios
//!     ├── pipeline.rs   # Concurrent writers, reorgs, contiguity
//!     ├── audit_repair.rs # Degradation cycles and targeted repair
//!     └── streaming.rs  # Live subscription against the fake node
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ingest-tests
//! cargo test -p ingest-tests integration::streaming::
//! ```

#![allow(dead_code)]

pub mod integration;
pub mod support;
