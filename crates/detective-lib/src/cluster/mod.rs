//! Cluster query interface
//!
//! The detector only needs two things from the cluster: the current state
//! of the pods it watches and the tail of a container's log. Both sit
//! behind [`ClusterQuery`] so the detection loop can run against the
//! Kubernetes API or an in-memory fake.

mod kube_api;

pub use kube_api::{observe_pod, KubeCluster};

use crate::models::WorkloadStatus;
use async_trait::async_trait;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Listing pods failed; the detector cannot continue
#[derive(Debug, Error)]
#[error("failed to list pods in namespace '{namespace}': {source}")]
pub struct QueryError {
    pub namespace: String,
    #[source]
    pub source: BoxError,
}

impl QueryError {
    pub fn new(namespace: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            namespace: namespace.into(),
            source: source.into(),
        }
    }
}

/// Fetching a log tail failed; callers fall back to an empty tail
#[derive(Debug, Error)]
#[error("failed to fetch logs for {namespace}/{pod} container '{container}': {source}")]
pub struct LogError {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    #[source]
    pub source: BoxError,
}

impl LogError {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
            source: source.into(),
        }
    }
}

/// Optional narrowing of the pods a detector watches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadFilter {
    /// Exact pod name
    pub name: Option<String>,
    /// Kubernetes label selector, e.g. `app=web,tier!=cache`
    pub label_selector: Option<String>,
}

impl WorkloadFilter {
    /// Field selector expression for the name filter
    pub fn field_selector(&self) -> Option<String> {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| format!("metadata.name={}", name))
    }

    /// Label selector, ignoring empty strings
    pub fn labels(&self) -> Option<&str> {
        self.label_selector.as_deref().filter(|s| !s.is_empty())
    }
}

/// Read access to pod state and logs
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// List pods in a namespace with their container observations
    async fn list_workloads(
        &self,
        namespace: &str,
        filter: &WorkloadFilter,
    ) -> Result<Vec<WorkloadStatus>, QueryError>;

    /// Fetch the last `lines` log lines of one container
    async fn fetch_log_tail(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        lines: i64,
    ) -> Result<String, LogError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_field_selector_from_name() {
        let filter = WorkloadFilter {
            name: Some("web-0".to_string()),
            label_selector: None,
        };
        assert_eq!(filter.field_selector().as_deref(), Some("metadata.name=web-0"));
        assert_eq!(filter.labels(), None);
    }

    #[test]
    fn test_empty_filters_are_ignored() {
        let filter = WorkloadFilter {
            name: Some(String::new()),
            label_selector: Some(String::new()),
        };
        assert_eq!(filter.field_selector(), None);
        assert_eq!(filter.labels(), None);
    }

    #[test]
    fn test_query_error_display_and_source() {
        let err = QueryError::new("prod", "connection refused");
        assert_eq!(
            err.to_string(),
            "failed to list pods in namespace 'prod': connection refused"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_log_error_display() {
        let err = LogError::new("prod", "web-0", "app", "container not found");
        assert!(err.to_string().contains("prod/web-0"));
        assert!(err.to_string().contains("'app'"));
    }
}
