//! # Adapters

pub mod http;
