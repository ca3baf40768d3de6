//! # Retry delay counter for session (re)creation.
//!
//! [`RetryBackoff`] tracks how long the client waits before a new create or
//! bind attempt. The same value doubles as the *connect timeout* while a
//! create request is in flight.
//!
//! ## Growth
//! ```text
//! increase() #1..#9   ─► delay stays at floor
//! increase() #10..    ─► delay = min(delay * 2, cap)
//! reset(floor)        ─► attempts = 0, delay = floor, cap = max(60s, floor)
//! ```
//!
//! ## Rules
//! - `floor <= current_delay() <= cap` at all times.
//! - The first nine failures keep the configured delay so short outages
//!   are retried quickly; only persistent failures slow the client down.

use std::time::Duration;

/// Lowest value the delay ceiling may take.
pub const MIN_CAP: Duration = Duration::from_secs(60);

/// Number of `increase()` calls absorbed before the delay starts doubling.
pub const FLAT_ATTEMPTS: u32 = 9;

/// Counter producing the delay before the next session attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBackoff {
    attempts: u32,
    floor: Duration,
    cap: Duration,
    current: Duration,
}

impl RetryBackoff {
    /// Creates a counter starting at `floor`.
    pub fn new(floor: Duration) -> Self {
        Self {
            attempts: 0,
            floor,
            cap: floor.max(MIN_CAP),
            current: floor,
        }
    }

    /// Restarts the counter from a (possibly new) floor.
    pub fn reset(&mut self, floor: Duration) {
        *self = Self::new(floor);
    }

    /// Records one failed attempt.
    ///
    /// Doubles the delay (bounded by the cap) once [`FLAT_ATTEMPTS`] failures
    /// have already been recorded.
    pub fn increase(&mut self) {
        if self.attempts >= FLAT_ATTEMPTS && self.current < self.cap {
            self.current = self.current.saturating_mul(2).min(self.cap);
        }
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Delay to apply before the next attempt (also the connect timeout).
    #[inline]
    pub fn current_delay(&self) -> Duration {
        self.current
    }

    /// Failures recorded since the last reset.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[inline]
    pub fn floor(&self) -> Duration {
        self.floor
    }

    #[inline]
    pub fn cap(&self) -> Duration {
        self.cap
    }
}

impl Default for RetryBackoff {
    /// Floor of 4 seconds, the client's default retry delay.
    fn default() -> Self {
        Self::new(Duration::from_secs(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_nine_increases_keep_floor() {
        let mut b = RetryBackoff::new(Duration::from_secs(4));
        for _ in 0..9 {
            b.increase();
            assert_eq!(b.current_delay(), Duration::from_secs(4));
        }
        assert_eq!(b.attempts(), 9);
    }

    #[test]
    fn test_tenth_increase_doubles() {
        let mut b = RetryBackoff::new(Duration::from_secs(4));
        for _ in 0..10 {
            b.increase();
        }
        assert_eq!(b.current_delay(), Duration::from_secs(8));
        b.increase();
        assert_eq!(b.current_delay(), Duration::from_secs(16));
    }

    #[test]
    fn test_growth_stops_at_cap() {
        let mut b = RetryBackoff::new(Duration::from_secs(4));
        for _ in 0..40 {
            b.increase();
            assert!(b.current_delay() <= b.cap());
            assert!(b.current_delay() >= b.floor());
        }
        assert_eq!(b.current_delay(), MIN_CAP);
    }

    #[test]
    fn test_floor_above_default_cap_raises_cap() {
        let mut b = RetryBackoff::new(Duration::from_secs(90));
        assert_eq!(b.cap(), Duration::from_secs(90));
        for _ in 0..20 {
            b.increase();
        }
        assert_eq!(b.current_delay(), Duration::from_secs(90));
    }

    #[test]
    fn test_reset_applies_new_floor() {
        let mut b = RetryBackoff::new(Duration::from_secs(4));
        for _ in 0..12 {
            b.increase();
        }
        b.reset(Duration::from_secs(2));
        assert_eq!(b.attempts(), 0);
        assert_eq!(b.current_delay(), Duration::from_secs(2));
        assert_eq!(b.cap(), MIN_CAP);
    }
}
