//! Pod failure detection library
//!
//! This crate provides the core functionality for:
//! - Classifying container states into actionable failures
//! - Polling pods and deduplicating persistent failures
//! - Rendering plain-text explanations with remediation steps
//! - Health checks and observability

pub mod classifier;
pub mod cluster;
pub mod detector;
pub mod explainer;
pub mod health;
pub mod models;
pub mod observability;

pub use cluster::{ClusterQuery, KubeCluster, LogError, QueryError, WorkloadFilter};
pub use detector::{
    DedupPolicy, DetectorConfig, FailureDetector, FailureDetectorBuilder, ScanResults,
};
pub use explainer::explain;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};
