//! Logging infrastructure
//!
//! Structured logging with tracing: compact console output, optional JSON,
//! optional log file.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};
