//! Failure detection loop
//!
//! Polls the watched pods on an interval, classifies every container state,
//! deduplicates persistent failures and sends one [`Report`] per newly seen
//! failure over a bounded channel.

mod dedup;

pub use dedup::{DedupKey, DedupPolicy, SeenSet, DEFAULT_MAX_ENTRIES};

use crate::classifier::{
    is_actionable_failure, is_failed_exit, normalize_terminated_reason, DEFAULT_TERMINATED_REASON,
};
use crate::cluster::{ClusterQuery, QueryError, WorkloadFilter};
use crate::explainer::explain;
use crate::health::{components, HealthRegistry};
use crate::models::{ContainerObservation, ContainerPhase, FailureRecord, Report, WorkloadRef};
use crate::observability::{DetectorMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Shortest accepted poll interval
const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Waiting reason that carries the exit code of the previous termination
const CRASH_LOOP_REASON: &str = DEFAULT_TERMINATED_REASON;

/// Smallest re-notify window for a poll interval
///
/// A key is only refreshed when a poll observes it, so the window has to
/// span more than one interval or a persistent failure expires between polls.
pub fn min_renotify_window(interval: Duration) -> Duration {
    interval.max(MIN_INTERVAL) * 2
}

/// Configuration for the detection loop
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Namespace to watch (default: "default")
    pub namespace: String,
    /// Optional pod name / label narrowing
    pub filter: WorkloadFilter,
    /// Delay between polls (default: 10 seconds)
    pub interval: Duration,
    /// Log lines fetched per failure (default: 10)
    pub log_tail_lines: i64,
    pub dedup: DedupPolicy,
    /// Channel buffer size for reports
    pub buffer_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            filter: WorkloadFilter::default(),
            interval: Duration::from_secs(10),
            log_tail_lines: 10,
            dedup: DedupPolicy::default(),
            buffer_size: 100,
        }
    }
}

/// A failure signature extracted from one container observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFailure {
    pub key: DedupKey,
    pub reason: String,
    pub message: String,
    pub exit_code: i32,
}

/// Classify one container's current state
///
/// Returns `None` for running containers, clean exits and waiting reasons
/// that are not failures.
pub fn detect_failure(
    workload: &WorkloadRef,
    container: &ContainerObservation,
) -> Option<DetectedFailure> {
    match &container.phase {
        ContainerPhase::Waiting { reason, message } if is_actionable_failure(reason) => {
            Some(DetectedFailure {
                key: DedupKey::waiting(workload, &container.name, reason),
                reason: reason.clone(),
                message: message.clone(),
                exit_code: if reason == CRASH_LOOP_REASON {
                    container.last_exit_code.unwrap_or(0)
                } else {
                    0
                },
            })
        }
        ContainerPhase::Terminated {
            reason,
            message,
            exit_code,
        } if is_failed_exit(*exit_code) => Some(DetectedFailure {
            key: DedupKey::terminated(workload, &container.name, *exit_code),
            reason: normalize_terminated_reason(reason).to_string(),
            message: message.clone(),
            exit_code: *exit_code,
        }),
        _ => None,
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResults {
    pub pods: usize,
    pub containers: usize,
    /// Failures reported for the first time
    pub reported: usize,
    /// Failures already tracked and therefore skipped
    pub suppressed: usize,
    pub log_errors: usize,
    /// Keys dropped by the re-notify sweep
    pub expired: usize,
    /// Nobody is consuming reports any more
    pub receiver_closed: bool,
}

/// Polls the cluster and reports new container failures
pub struct FailureDetector {
    cluster: Arc<dyn ClusterQuery>,
    config: DetectorConfig,
    seen: SeenSet,
    report_tx: mpsc::Sender<Report>,
    metrics: DetectorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl FailureDetector {
    /// Create a detector and the receiving end of its report channel
    pub fn new(
        cluster: Arc<dyn ClusterQuery>,
        config: DetectorConfig,
    ) -> (Self, mpsc::Receiver<Report>) {
        let mut config = config;
        if let Some(window) = config.dedup.renotify_after {
            let floor = min_renotify_window(config.interval);
            if window < floor {
                warn!(
                    requested_secs = window.as_secs_f64(),
                    applied_secs = floor.as_secs_f64(),
                    "Re-notify window shorter than two poll intervals, widening"
                );
                config.dedup.renotify_after = Some(floor);
            }
        }

        let (report_tx, report_rx) = mpsc::channel(config.buffer_size.max(1));

        let detector = Self {
            cluster,
            seen: SeenSet::new(config.dedup),
            logger: StructuredLogger::new(config.namespace.clone()),
            metrics: DetectorMetrics::new(),
            report_tx,
            config,
            health: None,
        };

        (detector, report_rx)
    }

    /// Publish component health into `registry` while running
    pub fn with_health(mut self, registry: HealthRegistry) -> Self {
        self.health = Some(registry);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Number of failure keys currently tracked
    pub fn tracked_failures(&self) -> usize {
        self.seen.len()
    }

    /// Run until shutdown is signalled or listing pods fails
    ///
    /// The first poll happens immediately, later polls every configured
    /// interval.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), QueryError> {
        let period = self.config.interval.max(MIN_INTERVAL);
        self.logger
            .log_startup(env!("CARGO_PKG_VERSION"), period.as_secs());
        self.register_health().await;

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    self.logger.log_shutdown("shutdown_signal");
                    break;
                }
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(results) if results.receiver_closed => {
                            self.logger.log_shutdown("report_receiver_dropped");
                            break;
                        }
                        Ok(results) => {
                            debug!(
                                pods = results.pods,
                                containers = results.containers,
                                reported = results.reported,
                                suppressed = results.suppressed,
                                tracked = self.seen.len(),
                                "Poll cycle complete"
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "Pod query failed, stopping detector");
                            self.logger.log_shutdown("query_error");
                            return Err(e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Execute a single poll: list, classify, deduplicate and report
    pub async fn poll_once(&mut self) -> Result<ScanResults, QueryError> {
        let start = Instant::now();
        let mut results = ScanResults {
            expired: self.seen.sweep(),
            ..ScanResults::default()
        };

        if results.expired > 0 {
            debug!(expired = results.expired, "Forgot quiet failures");
        }

        let workloads = match self
            .cluster
            .list_workloads(&self.config.namespace, &self.config.filter)
            .await
        {
            Ok(workloads) => workloads,
            Err(e) => {
                self.metrics.inc_query_errors();
                if let Some(health) = &self.health {
                    health
                        .set_unhealthy(components::CLUSTER_API, e.to_string())
                        .await;
                    health
                        .set_unhealthy(components::DETECTOR, "stopped after query failure")
                        .await;
                }
                return Err(e);
            }
        };

        results.pods = workloads.len();

        'scan: for status in &workloads {
            for container in &status.containers {
                results.containers += 1;

                let Some(failure) = detect_failure(&status.workload, container) else {
                    continue;
                };

                if !self.seen.observe(&failure.key) {
                    results.suppressed += 1;
                    continue;
                }

                let log_tail = match self
                    .cluster
                    .fetch_log_tail(
                        &status.workload.namespace,
                        &status.workload.name,
                        &container.name,
                        self.config.log_tail_lines,
                    )
                    .await
                {
                    Ok(tail) => tail,
                    Err(e) => {
                        results.log_errors += 1;
                        self.metrics.inc_log_fetch_errors();
                        self.logger.log_fetch_failed(
                            &status.workload.name,
                            &container.name,
                            &e.to_string(),
                        );
                        String::new()
                    }
                };

                let record = FailureRecord {
                    workload: status.workload.clone(),
                    container: container.name.clone(),
                    reason: failure.reason,
                    message: failure.message,
                    exit_code: failure.exit_code,
                    image: container.image.clone(),
                    log_tail,
                    restart_count: container.restart_count,
                    init_container: container.init_container,
                };

                self.logger.log_failure(&record);
                let reason = record.reason.clone();
                let explanation = explain(&record);
                if self.report_tx.send(Report { record, explanation }).await.is_err() {
                    warn!("Report receiver dropped, stopping scan");
                    results.receiver_closed = true;
                    break 'scan;
                }

                self.metrics.inc_failures_reported(&reason);
                results.reported += 1;
            }
        }

        self.metrics
            .observe_poll(start.elapsed().as_secs_f64(), results.pods);
        self.metrics.set_tracked_failures(self.seen.len());
        self.update_health(&results).await;

        Ok(results)
    }

    async fn register_health(&self) {
        if let Some(health) = &self.health {
            health.register(components::DETECTOR).await;
            health.register(components::CLUSTER_API).await;
        }
    }

    async fn update_health(&self, results: &ScanResults) {
        let Some(health) = &self.health else {
            return;
        };

        health.set_healthy(components::DETECTOR).await;
        if results.log_errors > 0 {
            health
                .set_degraded(
                    components::CLUSTER_API,
                    format!("{} log tail(s) unavailable", results.log_errors),
                )
                .await;
        } else {
            health.set_healthy(components::CLUSTER_API).await;
        }
        health.set_ready(true).await;
    }
}

/// Error building a detector
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cluster query implementation is required")]
    MissingCluster,
}

/// Builder for creating a detector
pub struct FailureDetectorBuilder {
    cluster: Option<Arc<dyn ClusterQuery>>,
    config: DetectorConfig,
    health: Option<HealthRegistry>,
}

impl FailureDetectorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            cluster: None,
            config: DetectorConfig::default(),
            health: None,
        }
    }

    /// Set the cluster query implementation
    pub fn cluster(mut self, cluster: Arc<dyn ClusterQuery>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Only watch the pod with this exact name
    pub fn pod_name(mut self, name: impl Into<String>) -> Self {
        self.config.filter.name = Some(name.into());
        self
    }

    pub fn label_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.filter.label_selector = Some(selector.into());
        self
    }

    /// Set the poll interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn log_tail_lines(mut self, lines: i64) -> Self {
        self.config.log_tail_lines = lines;
        self
    }

    /// Report a failure again once it has been quiet for `window`
    pub fn renotify_after(mut self, window: Duration) -> Self {
        self.config.dedup.renotify_after = Some(window);
        self
    }

    /// Cap the number of tracked failure keys
    pub fn max_tracked_failures(mut self, max: usize) -> Self {
        self.config.dedup.max_entries = Some(max);
        self
    }

    /// Set the buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn health(mut self, registry: HealthRegistry) -> Self {
        self.health = Some(registry);
        self
    }

    /// Build the detector
    pub fn build(self) -> Result<(FailureDetector, mpsc::Receiver<Report>), BuildError> {
        let cluster = self.cluster.ok_or(BuildError::MissingCluster)?;

        info!(
            namespace = %self.config.namespace,
            interval_secs = self.config.interval.as_secs(),
            "Configured failure detector"
        );

        let (mut detector, rx) = FailureDetector::new(cluster, self.config);
        detector.health = self.health;
        Ok((detector, rx))
    }
}

impl Default for FailureDetectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
