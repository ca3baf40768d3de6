//! # Tutors: per-request retry supervision
//!
//! Control requests travel over links that may lose them silently. Every
//! request that needs a confirmation is paired with a [`Tutor`]: after a
//! timeout the tutor checks the [`RequestLedger`] and either lets the request
//! go, or builds a retransmission carried by a fresh tutor.
//!
//! ```text
//! send(request) ──► TutorTable::arm ──► Schedule(timeout, Timer::Tutor(id))
//!                                               │
//!                          Timer::Tutor(id) ◄───┘
//!                                 │
//!                 ┌───────────────┼─────────────────────┐
//!                 ▼               ▼                     ▼
//!          verify_success   !should_be_sent      should_be_sent
//!              Done             Moot           do_recovery() ─► Retransmit
//!                                                 (new request, new tutor,
//!                                                  timeout doubled)
//! ```
//!
//! ## Rules
//! - A tutor instance is single-use: it ends at its first timeout, and a
//!   retransmission always gets a new instance with a new [`TutorId`].
//! - `notify_abort` runs at most once per request chain.
//! - Timeouts start at `Config::tutor_timeout` and double per
//!   retransmission, capped at one minute, unless the tutor fixes its own.

mod kinds;
mod ledger;
mod table;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::{Notification, RequestKind, SubscriptionId};

pub use kinds::{
    ConstrainTutor, ForceRebindTutor, MessageTutor, ReconfigureTutor, SubscribeTutor,
    UnsubscribeTutor,
};
pub use ledger::{RequestLedger, Resolution, SessionView};
pub use table::{TutorId, TutorStep, TutorTable};

/// Retry supervisor of one in-flight control request.
pub trait Tutor: Send + fmt::Debug {
    /// Request kind, for logs.
    fn kind(&self) -> &'static str;

    /// Overrides the computed timeout.
    fn fixed_timeout(&self) -> Option<Duration> {
        None
    }

    /// What an acknowledgment of this tutor's request resolves.
    fn resolution(&self) -> Resolution;

    /// Whether the goal of the request has been reached.
    fn verify_success(&self, ledger: &RequestLedger) -> bool;

    /// Whether the request is still meaningful.
    fn should_be_sent(&self, ledger: &RequestLedger) -> bool;

    /// Builds the retransmission and the tutor that will supervise it.
    fn do_recovery(&self, ledger: &mut RequestLedger) -> (RequestKind, Box<dyn Tutor>);

    /// The request became permanently moot. May hand back a notification
    /// for collaborators.
    fn notify_abort(&mut self) -> Option<Notification> {
        None
    }

    /// Outcome of handing the request to the wire.
    fn notify_sender(&mut self, _failed: bool) {}

    /// Whether the tutor supervises a request on behalf of `subscription`.
    fn concerns(&self, _subscription: SubscriptionId) -> bool {
        false
    }
}

/// A control request waiting to be stamped and sent.
#[derive(Debug)]
pub struct PendingRequest {
    pub kind: RequestKind,
    pub cause: Arc<str>,
    pub tutor: Box<dyn Tutor>,
    /// Retransmission number; 0 for the first send.
    pub attempt: u32,
}

impl PendingRequest {
    pub fn new(kind: RequestKind, cause: impl Into<Arc<str>>, tutor: Box<dyn Tutor>) -> Self {
        Self {
            kind,
            cause: cause.into(),
            tutor,
            attempt: 0,
        }
    }
}
