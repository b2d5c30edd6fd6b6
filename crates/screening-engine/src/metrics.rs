// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics module
//!
//! Provides global metrics using the default Prometheus registry via macros.
//! The engine has no HTTP surface of its own; the hosting layer exposes
//! [`gather_metrics`] wherever it serves scrapes.

use std::sync::LazyLock;

use prometheus::{
    Encoder, Gauge, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
    register_gauge, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge,
};

use crate::{
    cache::CacheTier,
    error::{EngineError, EngineResult},
};

/// Total number of evaluations, labeled by recommendation.
pub static EVALUATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "call_screen_evaluations_total",
        "Total number of caller evaluations, labeled by recommendation",
        &["recommendation"]
    )
    .expect("Failed to create call_screen_evaluations_total counter vec")
});

/// Histogram for evaluation durations in seconds.
pub static EVALUATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "call_screen_evaluation_duration",
        "Caller evaluation durations in seconds",
        &["recommendation"],
        vec![0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to create evaluation duration histogram")
});

/// Histogram for classifier run durations in seconds.
pub static CLASSIFIER_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "call_screen_classifier_duration",
        "Classifier run durations in seconds",
        &["result"],
        vec![0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to create classifier duration histogram")
});

/// Cache operation counters, labeled by tier and operation.
pub static CACHE_OPERATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "call_screen_cache_operations_total",
        "Total number of cache operations, labeled by tier and operation",
        &["tier", "operation"]
    )
    .expect("Failed to create cache operations counter vec")
});

/// Cache degraded-mode gauge (0 or 1).
pub static CACHE_DEGRADED: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        "call_screen_cache_degraded",
        "Whether the cache is in degraded mode (0 or 1)"
    )
    .expect("Failed to create cache degraded gauge")
});

/// Learning queue depth gauge.
pub static LEARNING_QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "call_screen_learning_queue_depth",
        "Current number of events waiting in the learning queue"
    )
    .expect("Failed to create learning queue depth gauge")
});

/// Processed learning event counters, labeled by event kind.
pub static LEARNING_EVENTS_PROCESSED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "call_screen_learning_events_processed_total",
        "Total number of learning events processed, labeled by kind",
        &["kind"]
    )
    .expect("Failed to create learning events processed counter vec")
});

/// Dropped learning event counter.
pub static LEARNING_EVENTS_DROPPED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "call_screen_learning_events_dropped_total",
        "Total number of learning events dropped due to a full queue"
    )
    .expect("Failed to create learning events dropped counter")
});

/// Record a completed evaluation
///
/// # Arguments
/// * `recommendation` - The recommended action
/// * `duration_secs` - The duration of the evaluation in seconds
pub fn record_evaluation(recommendation: &str, duration_secs: f64) {
    EVALUATIONS_TOTAL
        .with_label_values(&[recommendation])
        .inc();
    EVALUATION_DURATION
        .with_label_values(&[recommendation])
        .observe(duration_secs);
}

/// Observe the duration of a classifier run
///
/// # Arguments
/// * `result` - The classifier outcome (spam, legitimate, timeout, error)
/// * `duration_secs` - The duration of the run in seconds
pub fn observe_classifier_duration(result: &str, duration_secs: f64) {
    CLASSIFIER_DURATION
        .with_label_values(&[result])
        .observe(duration_secs);
}

/// Record a cache operation
///
/// # Arguments
/// * `tier` - The cache tier the operation hit
/// * `operation` - The cache operation (hit, miss, store, eviction, expired)
pub fn record_cache_op(tier: CacheTier, operation: &str) {
    CACHE_OPERATIONS
        .with_label_values(&[tier.as_str(), operation])
        .inc();
}

/// Set the cache degraded-mode gauge
pub fn set_cache_degraded(degraded: bool) {
    CACHE_DEGRADED.set(if degraded { 1.0 } else { 0.0 });
}

/// Update the learning queue depth gauge
pub fn set_learning_queue_depth(depth: usize) {
    #[allow(clippy::cast_possible_wrap)]
    LEARNING_QUEUE_DEPTH.set(depth as i64);
}

/// Record a processed learning event
///
/// # Arguments
/// * `kind` - The snake_case event kind
pub fn inc_learning_event_processed(kind: &str) {
    LEARNING_EVENTS_PROCESSED.with_label_values(&[kind]).inc();
}

/// Record a dropped learning event
pub fn inc_learning_event_dropped() {
    LEARNING_EVENTS_DROPPED.inc();
}

/// Export all registered metrics in Prometheus text format
///
/// # Errors
///
/// Returns `EngineError::Internal` if encoding fails.
pub fn gather_metrics() -> EngineResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| EngineError::internal(format!("failed to encode metrics: {e}")))?;

    String::from_utf8(buffer)
        .map_err(|e| EngineError::internal(format!("metrics buffer is not valid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathered_metrics_include_registered_families() {
        record_evaluation("block", 0.004);
        record_cache_op(CacheTier::SpamProfile, "hit");
        inc_learning_event_processed("reject");
        set_learning_queue_depth(3);

        let text = gather_metrics().unwrap();
        assert!(text.contains("call_screen_evaluations_total"));
        assert!(text.contains("call_screen_cache_operations_total"));
        assert!(text.contains("call_screen_learning_queue_depth"));
    }

    #[test]
    fn degraded_gauge_is_binary() {
        set_cache_degraded(true);
        assert!((CACHE_DEGRADED.get() - 1.0).abs() < f64::EPSILON);
        set_cache_degraded(false);
        assert!(CACHE_DEGRADED.get().abs() < f64::EPSILON);
    }
}
