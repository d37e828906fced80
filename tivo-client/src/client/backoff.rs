//! Reconnect delay schedule.

use std::time::Duration;

/// Shortest delay between reconnect attempts.
pub const MIN_BACKOFF: Duration = Duration::from_millis(10);

/// Exponential reconnect delay with a cap.
///
/// The first failure waits `initial`, each further failure doubles the wait
/// up to `max`. [`Backoff::reset`] is called once a connection succeeds.
/// Both bounds are raised to at least [`MIN_BACKOFF`].
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_BACKOFF);
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        compute_backoff(self.initial, self.max, self.attempt)
    }

    /// Number of consecutive failures recorded.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn compute_backoff(initial: Duration, max: Duration, attempt: u32) -> Duration {
    // 2^(attempt-1); checked_shl fails once the shift reaches 32.
    let exponent = attempt.saturating_sub(1);
    let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    initial.saturating_mul(multiplier).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.attempt(), 15);
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        assert_eq!(
            compute_backoff(Duration::from_secs(1), Duration::from_secs(30), u32::MAX),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_initial_never_spins() {
        let mut backoff = Backoff::new(Duration::ZERO, Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), MIN_BACKOFF);
        assert_eq!(backoff.next_delay(), MIN_BACKOFF * 2);

        let mut flat = Backoff::new(Duration::ZERO, Duration::ZERO);
        for _ in 0..5 {
            assert_eq!(flat.next_delay(), MIN_BACKOFF);
        }
    }

    #[test]
    fn test_cap_below_initial() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
