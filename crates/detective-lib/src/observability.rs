//! Observability infrastructure for the pod detective
//!
//! Provides:
//! - Prometheus metrics (poll latency, pods observed, failures reported, log fetch errors)
//! - Structured JSON logging with tracing

use crate::models::FailureRecord;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for poll latency (in seconds)
const POLL_LATENCY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

struct DetectorMetricsInner {
    polls_total: IntCounter,
    poll_latency_seconds: Histogram,
    query_errors: IntCounter,
    pods_observed: IntGauge,
    failures_reported: IntCounterVec,
    log_fetch_errors: IntCounter,
    tracked_failures: IntGauge,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            polls_total: register_int_counter!(
                "pod_detective_polls_total",
                "Number of completed pod polls"
            )
            .expect("Failed to register polls_total"),

            poll_latency_seconds: register_histogram!(
                "pod_detective_poll_latency_seconds",
                "Time spent listing and scanning pods in one cycle",
                POLL_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_latency_seconds"),

            query_errors: register_int_counter!(
                "pod_detective_query_errors_total",
                "Number of failed pod list calls"
            )
            .expect("Failed to register query_errors"),

            pods_observed: register_int_gauge!(
                "pod_detective_pods_observed",
                "Pods returned by the most recent poll"
            )
            .expect("Failed to register pods_observed"),

            failures_reported: register_int_counter_vec!(
                "pod_detective_failures_reported_total",
                "Container failures reported, by reason",
                &["reason"]
            )
            .expect("Failed to register failures_reported"),

            log_fetch_errors: register_int_counter!(
                "pod_detective_log_fetch_errors_total",
                "Log tails that could not be fetched"
            )
            .expect("Failed to register log_fetch_errors"),

            tracked_failures: register_int_gauge!(
                "pod_detective_tracked_failures",
                "Failure keys currently held for deduplication"
            )
            .expect("Failed to register tracked_failures"),
        }
    }
}

/// Detector metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a completed poll cycle
    pub fn observe_poll(&self, duration_secs: f64, pods: usize) {
        let inner = self.inner();
        inner.polls_total.inc();
        inner.poll_latency_seconds.observe(duration_secs);
        inner.pods_observed.set(pods as i64);
    }

    pub fn inc_query_errors(&self) {
        self.inner().query_errors.inc();
    }

    pub fn inc_failures_reported(&self, reason: &str) {
        self.inner()
            .failures_reported
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_log_fetch_errors(&self) {
        self.inner().log_fetch_errors.inc();
    }

    pub fn set_tracked_failures(&self, count: usize) {
        self.inner().tracked_failures.set(count as i64);
    }
}

/// Structured logger for detector events
///
/// Emits event-shaped records with a consistent field set so JSON log
/// pipelines can filter on `event`.
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Log detector startup
    pub fn log_startup(&self, version: &str, interval_secs: u64) {
        info!(
            event = "detector_started",
            namespace = %self.namespace,
            version = %version,
            interval_secs = interval_secs,
            "Watching pods"
        );
    }

    /// Log a newly reported failure
    pub fn log_failure(&self, record: &FailureRecord) {
        warn!(
            event = "failure_detected",
            namespace = %record.workload.namespace,
            pod = %record.workload.name,
            container = %record.container,
            reason = %record.reason,
            exit_code = record.exit_code,
            restart_count = record.restart_count,
            init_container = record.init_container,
            has_logs = !record.log_tail.is_empty(),
            "Container failure detected"
        );
    }

    /// Log a log tail that could not be retrieved
    pub fn log_fetch_failed(&self, pod: &str, container: &str, error: &str) {
        debug!(
            event = "log_fetch_failed",
            namespace = %self.namespace,
            pod = %pod,
            container = %container,
            error = %error,
            "Continuing without log tail"
        );
    }

    /// Log detector shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "detector_shutdown",
            namespace = %self.namespace,
            reason = %reason,
            "Pod detective shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_metrics_observations() {
        let metrics = DetectorMetrics::new();

        metrics.observe_poll(0.05, 12);
        metrics.inc_failures_reported("CrashLoopBackOff");
        metrics.inc_log_fetch_errors();
        metrics.inc_query_errors();
        metrics.set_tracked_failures(3);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "pod_detective_failures_reported_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("prod");
        assert_eq!(logger.namespace, "prod");
    }
}
