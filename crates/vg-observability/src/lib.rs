//! # vg-observability
//!
//! Logging setup and metrics instrumentation for Vigil.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingConfig};
