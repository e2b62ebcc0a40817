//! Observability module
//!
//! Structured logging setup, report spans and log-safety helpers.

pub mod telemetry;
