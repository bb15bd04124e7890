// Prometheus metrics for the judge pipeline

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, Encoder,
    HistogramVec, IntCounterVec, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Finished evaluations by mode and verdict
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "arbiter_submissions_total",
        "Evaluations completed, by mode and verdict",
        &["mode", "verdict"],
        REGISTRY
    )
    .unwrap();

    /// Individual test-case executions by outcome status
    pub static ref TEST_EXECUTIONS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "arbiter_test_executions_total",
        "Test case executions, by outcome status",
        &["status"],
        REGISTRY
    )
    .unwrap();

    pub static ref EVALUATION_SECONDS: HistogramVec = register_histogram_vec_with_registry!(
        "arbiter_evaluation_seconds",
        "Wall time of a whole evaluation",
        &["mode"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
        REGISTRY
    )
    .unwrap();
}

/// Render every registered metric in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_contains_counters() {
        SUBMISSIONS_TOTAL.with_label_values(&["run", "accepted"]).inc();
        let text = gather();
        assert!(text.contains("arbiter_submissions_total"));
    }
}
