//! # Backoff
//!
//! Two schedules are used by the controller:
//!
//! - [`FibonacciBackoff`] spaces out whole reconcile passes for a template that
//!   keeps failing (registry unavailable, render jobs failing). It counts in
//!   minutes: 1m, 1m, 2m, 3m, 5m, 8m, then the cap.
//! - [`RetryBackoff`] spaces out attempts of a single render job inside one
//!   pass. It doubles from an initial delay up to a cap and gives up after a
//!   fixed number of attempts.
//!
//! ```rust
//! use application_template_controller::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 120);
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator, in minutes
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// `min_minutes` seeds the sequence, `max_minutes` caps it
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes: max_minutes.max(min_minutes),
        }
    }

    /// Return the current delay in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result_seconds = self.current_minutes.saturating_mul(60);
        let next_minutes = self.prev_minutes.saturating_add(self.current_minutes);
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next_minutes.min(self.max_minutes);
        result_seconds
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Restart the sequence after a successful pass
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

/// Bounded exponential backoff for render job retries
///
/// `delay_for(1)` is the wait after the first failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl RetryBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay before the attempt following `failed_attempt`, or `None` once the cap is reached
    #[must_use]
    pub fn delay_for(&self, failed_attempt: u32) -> Option<Duration> {
        if failed_attempt == 0 || failed_attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(failed_attempt - 1);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }
}
