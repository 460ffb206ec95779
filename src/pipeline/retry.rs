//! fixed-delay retry policy for pipeline tasks

use std::time::Duration;
use tracing::debug;

/// how a failing task is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// extra attempts after the first failure
    pub retries: u32,
    /// blocking pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// fail on the first error
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// attempts a task gets in total
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// delay before the next attempt, or None once `attempt` (1-based) was the last
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts() {
            return None;
        }
        debug!(attempt, delay_ms = self.delay.as_millis() as u64, "scheduling retry");
        Some(self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::new(2, Duration::from_millis(50));
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(50)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(50)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_no_retries() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.next_delay(1), None);
    }

    #[test]
    fn test_default_is_one_retry_a_minute_later() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 1);
        assert_eq!(policy.delay, Duration::from_secs(60));
    }
}
