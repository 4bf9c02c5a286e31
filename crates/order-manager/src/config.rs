//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// What to do with a signal whose intent already has an order in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Refuse it with `DuplicateInFlight`
    #[default]
    Reject,
    /// Park its quantity and submit it once the in-flight order ends
    Coalesce,
    /// Admit it as an independent order
    Allow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub duplicate_policy: DuplicatePolicy,
    pub retry: RetryPolicy,
    /// Bound on a single submit call
    pub submit_timeout_ms: u64,
    /// Bound on waiting for a cancel confirmation
    pub cancel_timeout_ms: u64,
    /// Reconciliation interval for open orders (0 disables polling)
    pub status_poll_interval_ms: u64,
    /// Intake workers for queued signals
    pub worker_count: usize,
    /// Per-worker queue capacity
    pub intake_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Reject,
            retry: RetryPolicy::default(),
            submit_timeout_ms: 5_000,
            cancel_timeout_ms: 5_000,
            status_poll_interval_ms: 1_000,
            worker_count: 4,
            intake_capacity: 256,
        }
    }
}

impl CoordinatorConfig {
    /// Builder: Set duplicate policy
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Builder: Set retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder: Set status poll interval (0 disables polling)
    pub fn with_status_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    pub fn status_poll_interval(&self) -> Option<Duration> {
        (self.status_poll_interval_ms > 0)
            .then(|| Duration::from_millis(self.status_poll_interval_ms))
    }

    /// Human-readable problems with this configuration
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            problems.push("retry.max_delay_ms must be >= retry.base_delay_ms".to_string());
        }
        if self.submit_timeout_ms == 0 {
            problems.push("submit_timeout_ms must be positive".to_string());
        }
        if self.cancel_timeout_ms == 0 {
            problems.push("cancel_timeout_ms must be positive".to_string());
        }
        if self.worker_count == 0 {
            problems.push("worker_count must be at least 1".to_string());
        }
        if self.intake_capacity == 0 {
            problems.push("intake_capacity must be at least 1".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CoordinatorConfig::default().problems().is_empty());
    }

    #[test]
    fn test_partial_json() {
        let config: CoordinatorConfig = serde_json::from_str(
            r#"{"duplicate_policy": "coalesce", "retry": {"max_attempts": 2}, "status_poll_interval_ms": 0}"#,
        )
        .unwrap();

        assert_eq!(config.duplicate_policy, DuplicatePolicy::Coalesce);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 100);
        assert!(config.status_poll_interval().is_none());
    }

    #[test]
    fn test_problems_reported() {
        let config = CoordinatorConfig {
            worker_count: 0,
            retry: RetryPolicy {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.problems().len(), 2);
    }
}
