//! Prometheus metrics for core components.
//!
//! Covers the worker pools, the readiness gate and the external services
//! (Congress.gov, the language model, link probes). The server registers
//! everything from [`all_metrics`] into its registry.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Worker pools
// =============================================================================

/// Tasks finished by a pool, by kind and outcome.
pub static TASKS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("billwire_tasks_processed_total", "Total tasks processed"),
        &["kind", "outcome"], // "success", "failed", "malformed"
    )
    .unwrap()
});

/// Tasks republished for another attempt.
pub static TASK_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("billwire_task_retries_total", "Total task retries"),
        &["kind"],
    )
    .unwrap()
});

/// Messages routed to the error topic.
pub static ERROR_TOPIC_MESSAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "billwire_error_topic_messages_total",
            "Total failed tasks routed to the error topic",
        ),
        &["kind", "reason"],
    )
    .unwrap()
});

/// Handler wall time in seconds.
pub static HANDLER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "billwire_handler_duration_seconds",
            "Duration of a single handler invocation",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Readiness gate
// =============================================================================

/// Draft tasks emitted after winning the queue transition.
pub static DRAFTS_TRIGGERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "billwire_drafts_triggered_total",
        "Total article drafts queued",
    )
    .unwrap()
});

/// Link verdicts recorded.
pub static LINK_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("billwire_link_results_total", "Total link check verdicts"),
        &["outcome"], // "valid", "invalid"
    )
    .unwrap()
});

/// Bills reaching a terminal state.
pub static BILLS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("billwire_bills_finished_total", "Total bills finished"),
        &["outcome"], // "complete", "failed"
    )
    .unwrap()
});

// =============================================================================
// External services
// =============================================================================

/// Legislative API response cache lookups.
pub static LEGISLATIVE_CACHE: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "billwire_legislative_cache_total",
            "Legislative API cache lookups",
        ),
        &["result"], // "hit", "miss"
    )
    .unwrap()
});

/// Language model calls.
pub static MODEL_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("billwire_model_calls_total", "Total language model calls"),
        &["result"], // "success", "timeout", "error"
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(TASKS_PROCESSED.clone()),
        Box::new(TASK_RETRIES.clone()),
        Box::new(ERROR_TOPIC_MESSAGES.clone()),
        Box::new(HANDLER_DURATION.clone()),
        Box::new(DRAFTS_TRIGGERED.clone()),
        Box::new(LINK_RESULTS.clone()),
        Box::new(BILLS_FINISHED.clone()),
        Box::new(LEGISLATIVE_CACHE.clone()),
        Box::new(MODEL_CALLS.clone()),
    ]
}
