//! Deduplication of reported failures
//!
//! Every failure condition maps to a [`DedupKey`]. The [`SeenSet`] remembers
//! when each key was last observed so a condition that persists across polls
//! is reported once. Entries can optionally expire after a quiet period and
//! the set can be capped, evicting the least recently seen key.

use crate::models::WorkloadRef;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Default cap on tracked failure keys
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Identity of one failure condition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    /// Key for a container stuck waiting with a failure reason
    pub fn waiting(workload: &WorkloadRef, container: &str, reason: &str) -> Self {
        Self(format!("{}-{}-{}", workload, container, reason))
    }

    /// Key for a container that exited with a non-zero code
    pub fn terminated(workload: &WorkloadRef, container: &str, exit_code: i32) -> Self {
        Self(format!("{}-{}-terminated-{}", workload, container, exit_code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Retention rules for the seen set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupPolicy {
    /// Forget a key once it has not been observed for this long
    pub renotify_after: Option<Duration>,
    /// Maximum number of tracked keys
    pub max_entries: Option<usize>,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            renotify_after: None,
            max_entries: Some(DEFAULT_MAX_ENTRIES),
        }
    }
}

/// Failure keys already reported, with the instant each was last observed
#[derive(Debug)]
pub struct SeenSet {
    policy: DedupPolicy,
    last_seen: HashMap<DedupKey, Instant>,
}

impl SeenSet {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            last_seen: HashMap::new(),
        }
    }

    /// Record an observation of `key`
    ///
    /// Returns true when the key was not tracked, i.e. the failure should be
    /// reported. A tracked key only has its last-seen instant refreshed.
    pub fn observe(&mut self, key: &DedupKey) -> bool {
        let now = Instant::now();
        let window = self.policy.renotify_after;

        if let Some(seen) = self.last_seen.get_mut(key) {
            if !is_expired(window, *seen, now) {
                *seen = now;
                return false;
            }
        }

        self.last_seen.insert(key.clone(), now);
        self.enforce_capacity(key);
        true
    }

    /// Whether `key` is currently tracked
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.last_seen.contains_key(key)
    }

    /// Drop keys that have been quiet longer than the re-notify window
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&mut self) -> usize {
        let Some(window) = self.policy.renotify_after else {
            return 0;
        };

        let before = self.last_seen.len();
        let now = Instant::now();
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
        before - self.last_seen.len()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    /// Evict least recently seen keys beyond the cap, never `keep`
    fn enforce_capacity(&mut self, keep: &DedupKey) {
        let Some(max) = self.policy.max_entries else {
            return;
        };

        while self.last_seen.len() > max.max(1) {
            let oldest = self
                .last_seen
                .iter()
                .filter(|(key, _)| *key != keep)
                .min_by_key(|(_, seen)| **seen)
                .map(|(key, _)| key.clone());

            match oldest {
                Some(key) => {
                    self.last_seen.remove(&key);
                }
                None => break,
            }
        }
    }
}

fn is_expired(window: Option<Duration>, seen: Instant, now: Instant) -> bool {
    window
        .map(|window| now.saturating_duration_since(seen) >= window)
        .unwrap_or(false)
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(DedupPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web() -> WorkloadRef {
        WorkloadRef::new("prod", "web-0")
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(
            DedupKey::waiting(&web(), "app", "CrashLoopBackOff").as_str(),
            "prod/web-0-app-CrashLoopBackOff"
        );
        assert_eq!(
            DedupKey::terminated(&web(), "app", 137).as_str(),
            "prod/web-0-app-terminated-137"
        );
    }

    #[test]
    fn test_keys_change_with_condition() {
        let pull = DedupKey::waiting(&web(), "app", "ErrImagePull");
        let backoff = DedupKey::waiting(&web(), "app", "ImagePullBackOff");
        assert_ne!(pull, backoff);

        assert_ne!(
            DedupKey::terminated(&web(), "app", 1),
            DedupKey::terminated(&web(), "app", 2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_reported_once() {
        let mut seen = SeenSet::default();
        let key = DedupKey::waiting(&web(), "app", "CrashLoopBackOff");

        assert!(seen.observe(&key));
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(10)).await;
            assert!(!seen.observe(&key));
        }
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_window_keys_never_expire() {
        let mut seen = SeenSet::new(DedupPolicy {
            renotify_after: None,
            max_entries: None,
        });
        let key = DedupKey::terminated(&web(), "app", 1);

        assert!(seen.observe(&key));
        tokio::time::advance(Duration::from_secs(7 * 24 * 3600)).await;
        assert_eq!(seen.sweep(), 0);
        assert!(!seen.observe(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_key_is_reported_again_after_window() {
        let mut seen = SeenSet::new(DedupPolicy {
            renotify_after: Some(Duration::from_secs(60)),
            max_entries: None,
        });
        let key = DedupKey::waiting(&web(), "app", "CrashLoopBackOff");

        assert!(seen.observe(&key));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(seen.sweep(), 0);
        assert!(seen.contains(&key));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(seen.sweep(), 1);
        assert!(!seen.contains(&key));
        assert!(seen.observe(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_key_stays_suppressed_within_window() {
        let mut seen = SeenSet::new(DedupPolicy {
            renotify_after: Some(Duration::from_secs(60)),
            max_entries: None,
        });
        let key = DedupKey::waiting(&web(), "app", "ImagePullBackOff");

        assert!(seen.observe(&key));
        for _ in 0..20 {
            tokio::time::advance(Duration::from_secs(10)).await;
            seen.sweep();
            assert!(!seen.observe(&key));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_key_reported_without_sweep() {
        let mut seen = SeenSet::new(DedupPolicy {
            renotify_after: Some(Duration::from_secs(60)),
            max_entries: None,
        });
        let key = DedupKey::terminated(&web(), "app", 2);

        assert!(seen.observe(&key));
        tokio::time::advance(Duration::from_secs(90)).await;
        assert!(seen.observe(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_seen() {
        let mut seen = SeenSet::new(DedupPolicy {
            renotify_after: None,
            max_entries: Some(2),
        });
        let a = DedupKey::terminated(&web(), "a", 1);
        let b = DedupKey::terminated(&web(), "b", 1);
        let c = DedupKey::terminated(&web(), "c", 1);

        assert!(seen.observe(&a));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(seen.observe(&b));
        tokio::time::advance(Duration::from_secs(1)).await;
        // Refresh a so b becomes the oldest
        assert!(!seen.observe(&a));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(seen.observe(&c));

        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&a));
        assert!(!seen.contains(&b));
        assert!(seen.contains(&c));
    }
}
