//! Retry Policy
//!
//! Per-key retry budget with deterministic exponential delays, and the sleep
//! seam the dispatcher blocks on between attempts.

use backoff::backoff::Backoff;
use std::time::Duration;

/// Retry settings shared by every key in a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed on one key before rotating (at least 1)
    pub max_retries: u32,

    /// Base of the exponential delay
    pub backoff_base: u32,

    /// Length of one backoff time unit
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt number `attempt` (1-based):
    /// `unit * base^attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_base.saturating_pow(attempt);
        self.unit.saturating_mul(factor)
    }
}

/// Retry budget for the active key.
///
/// `next_backoff` counts one failed attempt and returns the wait before the next
/// one, or `None` once the budget is spent. `reset` is called on every rotation.
#[derive(Debug, Clone)]
pub struct AttemptBackoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl AttemptBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Failed attempts counted since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Backoff for AttemptBackoff {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt < self.policy.max_retries {
            Some(self.policy.delay(self.attempt))
        } else {
            None
        }
    }
}

/// Blocking wait between attempts
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_budget_is_spent_after_max_retries() {
        let mut backoff = AttemptBackoff::new(RetryPolicy::default());

        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(4)));
        assert_eq!(backoff.next_backoff(), None);
        assert_eq!(backoff.attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_single_attempt_budget_never_waits() {
        let mut backoff = AttemptBackoff::new(RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        });
        assert_eq!(backoff.next_backoff(), None);
    }

    #[test]
    fn test_custom_base_and_unit() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base: 3,
            unit: Duration::from_millis(10),
        };
        assert_eq!(policy.delay(2), Duration::from_millis(90));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy {
            max_retries: u32::MAX,
            backoff_base: 10,
            unit: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(40), Duration::from_secs(u32::MAX as u64));
    }
}
