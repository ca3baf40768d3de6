//! # Adaptive delay estimator.
//!
//! The server periodically reports how long the stream has been open on its
//! side. Comparing that with the local clock tells how far behind the client
//! is in consuming the stream. [`AdaptiveDelayEstimator`] keeps an
//! exponential moving average of that lag and flags a stream that cannot
//! keep up.
//!
//! ## Rules
//! - `sample = (now - reference) - server_elapsed`, in milliseconds.
//! - `mean = mean * 0.5 + sample * 0.5`; a mean under 60 ms is noise and is
//!   zeroed.
//! - A sample above 20 s and above twice the mean is held back once
//!   (probably the device slept); a second one in a row is applied.
//! - The stream is slow while `mean > 7000 ms`.

use std::time::Duration;
use tokio::time::Instant;

const MOMENTUM: f64 = 0.5;
const NOISE_FLOOR_MS: f64 = 60.0;
const SLOW_THRESHOLD_MS: f64 = 7000.0;
const SLEEP_SUSPECT_MS: f64 = 20000.0;

/// Result of one observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Normal,
    Slow,
    /// Sample withheld as suspected device sleep.
    Suspended,
}

#[derive(Clone, Debug, Default)]
pub struct AdaptiveDelayEstimator {
    reference: Option<Instant>,
    mean_ms: f64,
    suspect_pending: bool,
}

impl AdaptiveDelayEstimator {
    /// Starts measuring a new stream; `now` matches server elapsed zero.
    pub fn start_cycle(&mut self, now: Instant) {
        self.reference = Some(now);
        self.suspect_pending = false;
    }

    /// Feeds one server clock report.
    pub fn observe(&mut self, server_elapsed: Duration, now: Instant) -> Verdict {
        let Some(reference) = self.reference else {
            return Verdict::Normal;
        };
        let local = now.saturating_duration_since(reference);
        let sample = local.saturating_sub(server_elapsed).as_secs_f64() * 1000.0;

        if sample > SLEEP_SUSPECT_MS && sample > self.mean_ms * 2.0 && !self.suspect_pending {
            self.suspect_pending = true;
            return Verdict::Suspended;
        }
        self.suspect_pending = false;

        self.mean_ms = self.mean_ms * MOMENTUM + sample * (1.0 - MOMENTUM);
        if self.mean_ms < NOISE_FLOOR_MS {
            self.mean_ms = 0.0;
        }
        if self.mean_ms > SLOW_THRESHOLD_MS {
            Verdict::Slow
        } else {
            Verdict::Normal
        }
    }

    /// Current average lag.
    pub fn mean(&self) -> Duration {
        Duration::from_secs_f64(self.mean_ms / 1000.0)
    }
}
