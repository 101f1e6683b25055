//! Prometheus Metrics Definitions
//!
//! Counters are registered once with the default registry and exposed in
//! text format on `GET /metrics`.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

use crate::error::{ApiError, ApiResult};

/// Global metrics instance, initialized on first use.
pub static METRICS: Lazy<ApiResult<OrderlineMetrics>> = Lazy::new(OrderlineMetrics::new);

/// Outcome label for [`OrderlineMetrics::record_ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    DecodeFailed,
    Duplicate,
    StoreFailed,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Stored => "stored",
            IngestOutcome::DecodeFailed => "decode_failed",
            IngestOutcome::Duplicate => "duplicate",
            IngestOutcome::StoreFailed => "store_failed",
        }
    }
}

#[derive(Clone)]
pub struct OrderlineMetrics {
    /// Ingested messages - labels: outcome
    pub ingest_total: CounterVec,

    /// Order lookups - labels: result (hit, miss, not_found)
    pub cache_lookups_total: CounterVec,

    /// Offset commits - labels: status (success, error)
    pub consumer_commits_total: CounterVec,
}

impl OrderlineMetrics {
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            ingest_total: register_counter_vec!(
                "orderline_ingest_total",
                "Total number of ingested order messages",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register ingest_total: {}", e)))?,

            cache_lookups_total: register_counter_vec!(
                "orderline_cache_lookups_total",
                "Total number of order lookups by cache result",
                &["result"]
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e))
            })?,

            consumer_commits_total: register_counter_vec!(
                "orderline_consumer_commits_total",
                "Total number of stream offset commits",
                &["status"]
            )
            .map_err(|e| {
                ApiError::internal_error(format!("Failed to register consumer_commits_total: {}", e))
            })?,
        })
    }

    pub fn record_ingest(&self, outcome: IngestOutcome) {
        self.ingest_total.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn record_lookup(&self, result: &str) {
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn record_commit(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.consumer_commits_total
            .with_label_values(&[status])
            .inc();
    }
}

/// Run `f` against the global metrics, if registration succeeded.
pub fn with_metrics(f: impl FnOnce(&OrderlineMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Handler for GET /metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    // Force registration so counters appear before their first increment.
    if let Err(e) = METRICS.as_ref() {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.message.clone());
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        );
    }

    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Metrics are not UTF-8: {}", e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_metrics_register_once() {
        assert!(METRICS.as_ref().is_ok());
        with_metrics(|m| m.record_ingest(IngestOutcome::Stored));
        with_metrics(|m| m.record_commit(true));

        let metrics = METRICS.as_ref().unwrap();
        assert!(metrics.ingest_total.with_label_values(&["stored"]).get() >= 1.0);
        assert!(metrics.consumer_commits_total.with_label_values(&["success"]).get() >= 1.0);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(IngestOutcome::DecodeFailed.as_str(), "decode_failed");
        assert_eq!(IngestOutcome::Duplicate.as_str(), "duplicate");
    }
}
