//! Kubernetes API implementation of [`ClusterQuery`]

use super::{ClusterQuery, LogError, QueryError, WorkloadFilter};
use crate::models::{ContainerObservation, ContainerPhase, WorkloadRef, WorkloadStatus};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use kube::api::{Api, ListParams, LogParams};
use kube::Client;
use tracing::debug;

/// Cluster access backed by a `kube` client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterQuery for KubeCluster {
    async fn list_workloads(
        &self,
        namespace: &str,
        filter: &WorkloadFilter,
    ) -> Result<Vec<WorkloadStatus>, QueryError> {
        let mut params = ListParams::default();
        if let Some(labels) = filter.labels() {
            params = params.labels(labels);
        }
        if let Some(fields) = filter.field_selector() {
            params = params.fields(&fields);
        }

        debug!(
            namespace = %namespace,
            label_selector = ?params.label_selector,
            field_selector = ?params.field_selector,
            "Listing pods"
        );

        let pods = self
            .pods(namespace)
            .list(&params)
            .await
            .map_err(|e| QueryError::new(namespace, e))?;

        Ok(pods
            .items
            .iter()
            .filter_map(|pod| observe_pod(pod, namespace))
            .collect())
    }

    async fn fetch_log_tail(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        lines: i64,
    ) -> Result<String, LogError> {
        let params = LogParams {
            container: Some(container.to_string()),
            tail_lines: Some(lines),
            ..LogParams::default()
        };

        self.pods(namespace)
            .logs(pod, &params)
            .await
            .map_err(|e| LogError::new(namespace, pod, container, e))
    }
}

/// Convert a pod into container observations, init containers first
///
/// Returns `None` for pods without a name. `default_namespace` is used when
/// the object carries no namespace of its own.
pub fn observe_pod(pod: &Pod, default_namespace: &str) -> Option<WorkloadStatus> {
    let name = pod.metadata.name.clone()?;
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| default_namespace.to_string());

    let mut containers = Vec::new();
    if let Some(status) = &pod.status {
        let init = status.init_container_statuses.iter().flatten();
        let regular = status.container_statuses.iter().flatten();

        containers.extend(init.map(|s| observe_container(s, true)));
        containers.extend(regular.map(|s| observe_container(s, false)));
    }

    Some(WorkloadStatus {
        workload: WorkloadRef { namespace, name },
        containers,
    })
}

fn observe_container(status: &ContainerStatus, init_container: bool) -> ContainerObservation {
    let state = status.state.as_ref();

    let phase = if let Some(waiting) = state.and_then(|s| s.waiting.as_ref()) {
        ContainerPhase::Waiting {
            reason: waiting.reason.clone().unwrap_or_default(),
            message: waiting.message.clone().unwrap_or_default(),
        }
    } else if let Some(terminated) = state.and_then(|s| s.terminated.as_ref()) {
        ContainerPhase::Terminated {
            reason: terminated.reason.clone().unwrap_or_default(),
            message: terminated.message.clone().unwrap_or_default(),
            exit_code: terminated.exit_code,
        }
    } else {
        ContainerPhase::Running
    };

    let last_exit_code = status
        .last_state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .map(|t| t.exit_code);

    ContainerObservation {
        name: status.name.clone(),
        phase,
        image: status.image.clone(),
        restart_count: status.restart_count,
        init_container,
        last_exit_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStateWaiting,
        PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(name: &str, statuses: Vec<ContainerStatus>, init: Vec<ContainerStatus>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("prod".to_string()),
                ..ObjectMeta::default()
            },
            status: Some(PodStatus {
                container_statuses: Some(statuses),
                init_container_statuses: Some(init),
                ..PodStatus::default()
            }),
            ..Pod::default()
        }
    }

    fn status(name: &str, state: ContainerState) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            image: format!("example/{}:1.0", name),
            restart_count: 3,
            state: Some(state),
            ..ContainerStatus::default()
        }
    }

    #[test]
    fn test_waiting_container_with_previous_termination() {
        let mut crashing = status(
            "app",
            ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some("CrashLoopBackOff".to_string()),
                    message: Some("back-off 40s".to_string()),
                }),
                ..ContainerState::default()
            },
        );
        crashing.last_state = Some(ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code: 137,
                reason: Some("OOMKilled".to_string()),
                ..ContainerStateTerminated::default()
            }),
            ..ContainerState::default()
        });

        let observed = observe_pod(&pod("web-0", vec![crashing], vec![]), "default").unwrap();

        assert_eq!(observed.workload, WorkloadRef::new("prod", "web-0"));
        let app = &observed.containers[0];
        assert_eq!(
            app.phase,
            ContainerPhase::Waiting {
                reason: "CrashLoopBackOff".to_string(),
                message: "back-off 40s".to_string(),
            }
        );
        assert_eq!(app.last_exit_code, Some(137));
        assert_eq!(app.image, "example/app:1.0");
        assert_eq!(app.restart_count, 3);
        assert!(!app.init_container);
    }

    #[test]
    fn test_terminated_without_reason() {
        let exited = status(
            "job",
            ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: 1,
                    ..ContainerStateTerminated::default()
                }),
                ..ContainerState::default()
            },
        );

        let observed = observe_pod(&pod("batch-1", vec![exited], vec![]), "default").unwrap();

        assert_eq!(
            observed.containers[0].phase,
            ContainerPhase::Terminated {
                reason: String::new(),
                message: String::new(),
                exit_code: 1,
            }
        );
    }

    #[test]
    fn test_init_containers_come_first() {
        let running = status(
            "app",
            ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..ContainerState::default()
            },
        );
        let init = status(
            "migrate",
            ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some("ErrImagePull".to_string()),
                    message: None,
                }),
                ..ContainerState::default()
            },
        );

        let observed = observe_pod(&pod("web-1", vec![running], vec![init]), "default").unwrap();

        assert_eq!(observed.containers.len(), 2);
        assert_eq!(observed.containers[0].name, "migrate");
        assert!(observed.containers[0].init_container);
        assert_eq!(observed.containers[1].phase, ContainerPhase::Running);
    }

    #[test]
    fn test_pod_without_status_or_name() {
        let pending = Pod {
            metadata: ObjectMeta {
                name: Some("pending".to_string()),
                ..ObjectMeta::default()
            },
            ..Pod::default()
        };

        let observed = observe_pod(&pending, "staging").unwrap();
        assert_eq!(observed.workload.namespace, "staging");
        assert!(observed.containers.is_empty());

        assert!(observe_pod(&Pod::default(), "staging").is_none());
    }
}
