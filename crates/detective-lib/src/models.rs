//! Core data models for pod failure detection

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a monitored pod
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Current lifecycle phase of a container as reported by the kubelet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum ContainerPhase {
    Waiting {
        reason: String,
        message: String,
    },
    Running,
    Terminated {
        reason: String,
        message: String,
        exit_code: i32,
    },
}

/// Point-in-time view of one container, rebuilt on every poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerObservation {
    pub name: String,
    pub phase: ContainerPhase,
    pub image: String,
    pub restart_count: i32,
    pub init_container: bool,
    /// Exit code of the previous termination, if the kubelet still reports it
    pub last_exit_code: Option<i32>,
}

impl ContainerObservation {
    pub fn new(name: impl Into<String>, phase: ContainerPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            image: String::new(),
            restart_count: 0,
            init_container: false,
            last_exit_code: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_last_exit_code(mut self, code: i32) -> Self {
        self.last_exit_code = Some(code);
        self
    }
}

/// A pod together with the observed state of all its containers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub workload: WorkloadRef,
    pub containers: Vec<ContainerObservation>,
}

/// Normalized failure handed to the explainer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub workload: WorkloadRef,
    pub container: String,
    pub reason: String,
    pub message: String,
    /// 0 when no exit code applies
    pub exit_code: i32,
    pub image: String,
    /// Most recent log lines, empty when unavailable
    pub log_tail: String,
    #[serde(default)]
    pub restart_count: i32,
    #[serde(default)]
    pub init_container: bool,
}

/// A detected failure together with its rendered explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub record: FailureRecord,
    pub explanation: String,
}

impl Report {
    /// Text block as written to the console, delimited by the trailing separator
    pub fn block(&self) -> String {
        format!(
            "{}\n{}\n\n",
            self.explanation,
            crate::explainer::SEPARATOR
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FailureRecord {
        FailureRecord {
            workload: WorkloadRef::new("prod", "web-0"),
            container: "app".to_string(),
            reason: "OOMKilled".to_string(),
            message: String::new(),
            exit_code: 137,
            image: "example/web:1.0".to_string(),
            log_tail: String::new(),
            restart_count: 0,
            init_container: false,
        }
    }

    #[test]
    fn test_workload_ref_display() {
        assert_eq!(WorkloadRef::new("prod", "web-0").to_string(), "prod/web-0");
    }

    #[test]
    fn test_report_block_ends_with_separator() {
        let report = Report {
            record: record(),
            explanation: "body\n".to_string(),
        };
        assert_eq!(
            report.block(),
            "body\n\n=====================================\n\n"
        );
    }

    #[test]
    fn test_report_json_shape() {
        let report = Report {
            record: record(),
            explanation: "text".to_string(),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["record"]["workload"]["namespace"], "prod");
        assert_eq!(value["record"]["exit_code"], 137);
        assert_eq!(value["explanation"], "text");
    }

    #[test]
    fn test_container_phase_tagging() {
        let phase = ContainerPhase::Terminated {
            reason: "Error".to_string(),
            message: String::new(),
            exit_code: 1,
        };
        let value = serde_json::to_value(&phase).unwrap();
        assert_eq!(value["phase"], "terminated");
        assert_eq!(value["exit_code"], 1);
    }
}
