//! Reconnect delay policy.

use std::time::Duration;

/// Exponential backoff with a cap and a bounded number of attempts.
///
/// Delay for attempt `n` (1-indexed) is `min(base_delay * 2^(n-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt`. Attempt 0 is treated as attempt 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// True once `attempts` retries have been spent.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(policy: &BackoffPolicy, attempts: std::ops::RangeInclusive<u32>) -> Vec<u128> {
        attempts.map(|n| policy.delay_for(n).as_millis()).collect()
    }

    #[test]
    fn test_default_sequence() {
        let policy = BackoffPolicy::default();
        assert_eq!(millis(&policy, 1..=5), vec![1000, 2000, 4000, 8000, 16000]);
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(6).as_millis(), 30_000);
        assert_eq!(policy.delay_for(40).as_millis(), 30_000);
        assert_eq!(policy.delay_for(u32::MAX).as_millis(), 30_000);
    }

    #[test]
    fn test_zero_attempt_uses_base() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            max_attempts: 3,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(millis(&policy, 1..=5), vec![250, 500, 1000, 2000, 2000]);
    }
}
