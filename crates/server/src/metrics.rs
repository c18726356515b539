//! Prometheus metrics for the status server.
//!
//! HTTP request metrics plus gauges refreshed from the run snapshot and pool
//! statuses on every scrape. Core pipeline metrics are registered alongside.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "billwire_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("billwire_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

// =============================================================================
// Run Metrics (collected dynamically)
// =============================================================================

/// Bills by draft status.
pub static BILLS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("billwire_bills_by_status", "Target bills by draft status"),
        &["status"],
    )
    .unwrap()
});

/// Tasks completed so far in this run.
pub static RUN_TASKS_COMPLETED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "billwire_run_tasks_completed",
        "Tasks completed in the current run",
    )
    .unwrap()
});

/// Handlers currently executing, per pool.
pub static POOL_ACTIVE_TASKS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("billwire_pool_active_tasks", "Handlers currently running"),
        &["pool"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();

    // Run
    registry
        .register(Box::new(BILLS_BY_STATUS.clone()))
        .unwrap();
    registry
        .register(Box::new(RUN_TASKS_COMPLETED.clone()))
        .unwrap();
    registry
        .register(Box::new(POOL_ACTIVE_TASKS.clone()))
        .unwrap();

    // Core metrics (pools, gate, external services)
    for metric in billwire_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges from the current run state before a scrape.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let snapshot = state.snapshot().await;
    for status in ["not_ready", "queued", "complete", "failed"] {
        let count = snapshot
            .bills
            .iter()
            .filter(|b| b.draft_status.as_str() == status)
            .count();
        BILLS_BY_STATUS
            .with_label_values(&[status])
            .set(count as i64);
    }
    RUN_TASKS_COMPLETED.set(snapshot.tasks_completed);

    for pool in state.pool_statuses() {
        POOL_ACTIVE_TASKS
            .with_label_values(&[pool.name.as_str()])
            .set(pool.active_tasks as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("billwire_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_includes_core_metrics() {
        billwire_core::metrics::DRAFTS_TRIGGERED.inc_by(0);
        billwire_core::metrics::TASKS_PROCESSED
            .with_label_values(&["question", "success"])
            .inc_by(0);
        BILLS_BY_STATUS.with_label_values(&["complete"]).set(0);
        POOL_ACTIVE_TASKS.with_label_values(&["question-pool"]).set(0);

        let output = encode_metrics();
        assert!(output.contains("billwire_drafts_triggered_total"));
        assert!(output.contains("billwire_tasks_processed_total"));
        assert!(output.contains("billwire_bills_by_status"));
        assert!(output.contains("billwire_pool_active_tasks"));
    }
}
