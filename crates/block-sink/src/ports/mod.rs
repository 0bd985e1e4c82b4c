//! # Ports
//!
//! The outbound seam between the sink service and the actual storage
//! endpoint.

pub mod outbound;
