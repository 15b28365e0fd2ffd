//! Capped exponential backoff.
//!
//! Each failure doubles the wait, up to a ceiling; a success resets it.
//!
//! ```text
//! 500ms, 1s, 2s, 4s, 8s, 16s, 30s, 30s, ...
//! ```

use std::time::Duration;

/// First delay after a failure.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Longest delay between retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Returns the delay to wait now and doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.checked_mul(2).unwrap_or(self.max).min(self.max);
        delay
    }

    /// Starts over from the initial delay.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}
