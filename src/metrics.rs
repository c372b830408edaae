use std::sync::LazyLock;

use prometheus::*;

static METRIC_SEARCH_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "tm_search_count",
        "count of the search requests",
        &["with_context"]
    )
    .unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "tm_search_duration",
        "duration of the search request in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]
    )
    .unwrap()
});

static METRIC_FALLBACK_RESULTS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "tm_fallback_results",
        "count of the results ranked by visual similarity only"
    )
    .unwrap()
});

static METRIC_DEGENERATE_VECTORS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("tm_degenerate_vectors", "count of the zero-magnitude vectors").unwrap()
});

static METRIC_LOOKUP_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "tm_profile_lookup_failures",
        "count of the failed profile lookups",
        &["reason"]
    )
    .unwrap()
});

static METRIC_INDEX_RECOVERY: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "tm_index_recovery",
        "count of the index recovery events",
        &["outcome"]
    )
    .unwrap()
});

/// 记录一次搜索
pub fn inc_search_count(with_context: bool) {
    METRIC_SEARCH_COUNT.with_label_values(&[if with_context { "true" } else { "false" }]).inc();
}

pub fn observe_search_duration(duration: f32) {
    METRIC_SEARCH_DURATION.observe(duration as f64);
}

pub fn inc_fallback_results(n: usize) {
    METRIC_FALLBACK_RESULTS.inc_by(n as u64);
}

pub fn inc_degenerate_vector() {
    METRIC_DEGENERATE_VECTORS.inc();
}

/// reason: timeout / error
pub fn inc_lookup_failure(reason: &str) {
    METRIC_LOOKUP_FAILURES.with_label_values(&[reason]).inc();
}

/// outcome: loaded / rebuilt / cold_start / degraded
pub fn inc_index_recovery(outcome: &str) {
    METRIC_INDEX_RECOVERY.with_label_values(&[outcome]).inc();
}
