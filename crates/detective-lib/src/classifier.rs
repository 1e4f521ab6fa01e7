//! Container state reason classification
//!
//! Decides which waiting reasons count as actionable failures and how
//! terminated states without a reason are labelled.

/// Waiting reasons that indicate a failure worth explaining
pub const WAITING_FAILURE_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ImagePullBackOff",
    "ErrImagePull",
    "CreateContainerConfigError",
    "InvalidImageName",
    "RunContainerError",
];

/// Label used when a terminated container carries no reason
pub const DEFAULT_TERMINATED_REASON: &str = "CrashLoopBackOff";

/// Returns true if a waiting reason is a recognized failure (exact, case-sensitive)
pub fn is_actionable_failure(reason: &str) -> bool {
    WAITING_FAILURE_REASONS.contains(&reason)
}

/// Terminated containers are actionable on any non-zero exit code
pub fn is_failed_exit(exit_code: i32) -> bool {
    exit_code != 0
}

/// Normalize the reason of a terminated container
pub fn normalize_terminated_reason(reason: &str) -> &str {
    if reason.is_empty() {
        DEFAULT_TERMINATED_REASON
    } else {
        reason
    }
}
