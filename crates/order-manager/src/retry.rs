//! Retry policy for exchange submissions
//!
//! Exponential backoff with a cap: the delay after attempt `n` (0-based) is
//! `min(base * 2^n, max)`. The policy only counts attempts; deciding which
//! failures are retryable is the caller's job.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Total submit calls allowed, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            max_attempts,
        }
    }

    /// Delay to wait after the given (0-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Start counting attempts for one operation
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempts: 0,
        }
    }
}

/// Attempt counter for a single retried operation
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    /// Record that an attempt is being made; returns its 1-based number
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt is allowed after the ones made so far
    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_attempts
    }

    /// Delay before the next attempt
    pub fn next_delay(&self) -> Duration {
        self.policy.delay_for(self.attempts.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delay_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 10);

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_secs(1));
        assert_eq!(policy.delay_for(63), Duration::from_secs(1));
        assert_eq!(policy.delay_for(200), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_exhaustion() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        let mut backoff = policy.backoff();

        backoff.record_attempt();
        assert!(backoff.can_retry());
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));

        backoff.record_attempt();
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));

        assert_eq!(backoff.record_attempt(), 3);
        assert!(!backoff.can_retry());
    }
}
