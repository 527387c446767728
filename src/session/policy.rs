// src/session/policy.rs

use std::time::Duration;

use crate::session::{integrity::IntegrityPolicy, scoring::ScoringPolicy};

/// Retry schedule for saving a result.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries per save request, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

/// Everything tunable about one exam attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPolicy {
    /// Time allowed from start to deadline.
    pub duration: Duration,
    pub tick_interval: Duration,
    pub scoring: ScoringPolicy,
    pub integrity: IntegrityPolicy,
    pub retry: RetryPolicy,
    /// How long a finished session stays readable before it is evicted.
    pub completed_retention: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30 * 60),
            tick_interval: Duration::from_secs(1),
            scoring: ScoringPolicy::default(),
            integrity: IntegrityPolicy::default(),
            retry: RetryPolicy::default(),
            completed_retention: Duration::from_secs(5 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(3),
        };

        assert_eq!(retry.backoff(1), Duration::from_millis(500));
        assert_eq!(retry.backoff(2), Duration::from_millis(1000));
        assert_eq!(retry.backoff(3), Duration::from_millis(2000));
        assert_eq!(retry.backoff(4), Duration::from_secs(3));
        assert_eq!(retry.backoff(40), Duration::from_secs(3));
    }
}
