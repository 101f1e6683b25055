//! orderline Telemetry - Logging and Metrics
//!
//! Structured JSON logs through `tracing` and Prometheus counters for the
//! ingestion, cache and consumer paths.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_handler, OrderlineMetrics, METRICS};
pub use tracer::{init_tracing, DEFAULT_FILTER};
