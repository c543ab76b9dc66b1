//! Exponential backoff schedule for throttled upstream calls

use std::time::Duration;

/// Upper bound for any single wait
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Bounded exponential backoff
///
/// Attempt 1 waits `initial_backoff`, every further attempt doubles the wait,
/// capped at [`MAX_BACKOFF`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// Wait before retry number `attempt` (1-based), or None once retries are spent
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        let delay = self
            .initial_backoff
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF);
        Some(delay.min(MAX_BACKOFF))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_exhausted() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(1000)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(2000)));
        assert_eq!(policy.delay_for(4), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(40, Duration::from_secs(1));
        assert_eq!(policy.delay_for(10), Some(MAX_BACKOFF));
        assert_eq!(policy.delay_for(40), Some(MAX_BACKOFF));
    }

    #[test]
    fn test_zero_retries() {
        assert_eq!(RetryPolicy::new(0, Duration::from_millis(10)).delay_for(1), None);
    }
}
