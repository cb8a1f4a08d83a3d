//! # Error Backoff
//!
//! Exponential backoff used by the error policy when a reconcile fails.
//!
//! Each consecutive failure doubles the delay, starting at `start` and capped
//! at `max`. A successful reconcile resets the sequence.
//!
//! ## Usage
//!
//! ```rust
//! use github_token_manager::controller::backoff::ErrorBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ErrorBackoff::new(Duration::from_secs(5), Duration::from_secs(30));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(20));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(30));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBackoff {
    start: Duration,
    current: Duration,
    max: Duration,
    /// Consecutive failures since the last reset
    failures: u32,
}

impl ErrorBackoff {
    /// Create a backoff starting at `start` and capped at `max`
    ///
    /// A `max` below `start` is raised to `start`.
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        Self {
            start,
            current: start,
            max: max.max(start),
            failures: 0,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.failures = self.failures.saturating_add(1);
        result
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Reset to the initial state after a successful reconcile
    ///
    /// ```
    /// use github_token_manager::controller::backoff::ErrorBackoff;
    /// use std::time::Duration;
    ///
    /// let mut backoff = ErrorBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
    /// backoff.next_backoff();
    /// backoff.next_backoff();
    /// backoff.reset();
    /// assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
    /// ```
    pub fn reset(&mut self) {
        self.current = self.start;
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence_doubles_up_to_max() {
        let mut backoff = ErrorBackoff::new(Duration::from_millis(500), Duration::from_secs(3));
        let sequence: Vec<_> = (0..6).map(|_| backoff.next_backoff()).collect();
        assert_eq!(
            sequence,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
        assert_eq!(backoff.failures(), 6);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = ErrorBackoff::new(Duration::from_secs(5), Duration::from_secs(300));
        backoff.next_backoff();
        backoff.next_backoff();
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_max_below_start_is_raised() {
        let mut backoff = ErrorBackoff::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
    }
}
