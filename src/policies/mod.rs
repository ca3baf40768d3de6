//! Retry, recovery and pacing policies.
//!
//! Small, pure state holders used by the session machine. None of them
//! touches a clock or a timer on its own: callers pass `now` in and
//! schedule whatever delay the policy hands back.
//!
//! ## Contents
//! - [`RetryBackoff`]           delay before the next create/bind attempt (also the connect timeout)
//! - [`JitterPolicy`]           randomization of the first retry after a broken session
//! - [`RecoveryBudget`]         time left to recover a broken stream
//! - [`OfflineGate`]            throttles create attempts while the host is offline
//! - [`AdaptiveDelayEstimator`] detects a stream the client cannot keep up with
//! - [`Fence`]                  last-writer-wins ids for replaceable requests
//!
//! ## Quick wiring
//! ```text
//! Session
//!   ├─ create timeout / retry   ─► RetryBackoff::current_delay(), increase()
//!   ├─ broken established stream ─► JitterPolicy::apply(first_retry_max_delay)
//!   ├─ recover or recreate?      ─► RecoveryBudget::time_left()
//!   ├─ create while offline      ─► OfflineGate::check()
//!   └─ server clock report       ─► AdaptiveDelayEstimator::observe()
//! RequestLedger
//!   └─ constrain / reconfigure acks ─► Fence::acknowledge()
//! ```

mod backoff;
mod fencing;
mod jitter;
mod offline;
mod recovery;
mod slowness;

pub use backoff::RetryBackoff;
pub use fencing::Fence;
pub use jitter::JitterPolicy;
pub use offline::{GateDecision, GateToken, OfflineGate, RESET_AFTER};
pub use recovery::RecoveryBudget;
pub use slowness::{AdaptiveDelayEstimator, Verdict};
