//! # Jitter policy for first-retry delays.
//!
//! When an established session breaks, every client connected to the same
//! server tends to notice at the same moment. [`JitterPolicy`] spreads their
//! first retry over `[0, first_retry_max_delay]`.
//!
//! - [`JitterPolicy::None`]: use the configured maximum as is
//! - [`JitterPolicy::Full`]: uniform random delay in `[0, max]`

use rand::Rng;
use std::time::Duration;

/// Randomization applied to the first retry after a broken session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: wait exactly the configured maximum.
    ///
    /// Predictable; mostly useful in tests.
    None,

    /// Full jitter: random delay in `[0, max]`.
    Full,
}

impl Default for JitterPolicy {
    /// Returns [`JitterPolicy::Full`]: a reconnect storm is the common case.
    fn default() -> Self {
        JitterPolicy::Full
    }
}

impl JitterPolicy {
    /// Applies jitter to the given upper bound.
    pub fn apply(&self, max: Duration) -> Duration {
        match self {
            JitterPolicy::None => max,
            JitterPolicy::Full => full_jitter(max),
        }
    }
}

fn full_jitter(max: Duration) -> Duration {
    let ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 {
        return Duration::ZERO;
    }
    let mut rng = rand::rng();
    Duration::from_millis(rng.random_range(0..=ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_returns_max() {
        let max = Duration::from_millis(100);
        assert_eq!(JitterPolicy::None.apply(max), max);
    }

    #[test]
    fn test_full_stays_within_bounds() {
        let max = Duration::from_millis(100);
        for _ in 0..200 {
            assert!(JitterPolicy::Full.apply(max) <= max);
        }
    }

    #[test]
    fn test_full_zero_is_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_full_does_not_wrap_past_u64_millis() {
        let max = Duration::from_millis(u64::MAX) + Duration::from_secs(1);
        let d = JitterPolicy::Full.apply(max);
        assert!(d <= max);
        assert!(d > Duration::from_secs(1));
    }
}
