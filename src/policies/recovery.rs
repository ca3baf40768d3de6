//! # Recovery time budget.
//!
//! A broken stream may be *recovered* (the server replays what was lost)
//! instead of being replaced by a fresh session, but only for a limited
//! time. [`RecoveryBudget`] measures how much of that time is left.
//!
//! ## Lifecycle
//! ```text
//! not recovering ──inherit(prev, true)──► recovering (clock starts now)
//! recovering     ──inherit(prev, true)──► recovering (clock keeps running)
//! any            ──inherit(prev, false)─► not recovering
//! recovering     ──restore_time_left()──► not recovering (recovery succeeded)
//! ```
//!
//! ## Rules
//! - The clock runs iff the budget is in recovery mode.
//! - Consecutive recovery attempts share one clock, so a chain of failed
//!   recoveries cannot extend the budget.

use std::time::Duration;
use tokio::time::Instant;

/// Time budget for session recovery, carried from a session instance to its
/// successor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryBudget {
    started: Option<Instant>,
}

impl RecoveryBudget {
    /// Budget state for a successor instance.
    pub fn inherit(prev: &RecoveryBudget, recovering: bool, now: Instant) -> Self {
        let started = match (recovering, prev.started) {
            (true, Some(at)) => Some(at),
            (true, None) => Some(now),
            (false, _) => None,
        };
        Self { started }
    }

    /// Ends recovery mode after a successful recovery.
    pub fn restore_time_left(&mut self) {
        self.started = None;
    }

    #[inline]
    pub fn is_recovering(&self) -> bool {
        self.started.is_some()
    }

    /// Remaining budget; the whole budget when not recovering.
    pub fn time_left(&self, budget: Duration, now: Instant) -> Duration {
        match self.started {
            Some(at) => budget.saturating_sub(now.saturating_duration_since(at)),
            None => budget,
        }
    }
}
