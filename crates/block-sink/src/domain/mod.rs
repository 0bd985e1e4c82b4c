//! # Domain
//!
//! Storage-independent logic: the batch validation pipeline and gap-range
//! extraction over number scans.

pub mod gaps;
pub mod validation;
