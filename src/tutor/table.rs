//! Generic driver for all live tutors.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace};

use super::{PendingRequest, RequestLedger, Tutor};
use crate::protocol::{Notification, RequestId};

/// Ceiling of the computed tutor timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60);

/// Identifies one tutor instance; the token carried by its timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TutorId(u64);

/// Outcome of a tutor timeout.
#[derive(Debug)]
pub enum TutorStep {
    /// The tutor no longer exists (aborted or already fired).
    Stale,
    /// The request reached its goal.
    Done,
    /// The request no longer matters.
    Moot,
    /// Send this again.
    Retransmit(PendingRequest),
}

#[derive(Debug)]
struct Entry {
    request: RequestId,
    tutor: Box<dyn Tutor>,
    attempt: u32,
}

#[derive(Debug, Default)]
pub struct TutorTable {
    next: u64,
    entries: HashMap<TutorId, Entry>,
    by_request: HashMap<RequestId, TutorId>,
}

impl TutorTable {
    /// Starts supervising `request`; returns the timer token and its delay.
    pub fn arm(
        &mut self,
        request: RequestId,
        tutor: Box<dyn Tutor>,
        attempt: u32,
        base: Duration,
    ) -> (TutorId, Duration) {
        self.next += 1;
        let id = TutorId(self.next);
        let timeout = timeout_for(tutor.as_ref(), attempt, base);
        trace!(%request, kind = tutor.kind(), attempt, ?timeout, "tutor armed");
        self.entries.insert(
            id,
            Entry {
                request,
                tutor,
                attempt,
            },
        );
        self.by_request.insert(request, id);
        (id, timeout)
    }

    /// Runs the timeout check of tutor `id`.
    pub fn on_timeout(&mut self, id: TutorId, ledger: &mut RequestLedger) -> TutorStep {
        let Some(entry) = self.entries.remove(&id) else {
            return TutorStep::Stale;
        };
        self.by_request.remove(&entry.request);
        ledger.forget(entry.request);

        if entry.tutor.verify_success(ledger) {
            trace!(request = %entry.request, kind = entry.tutor.kind(), "request confirmed");
            return TutorStep::Done;
        }
        if !entry.tutor.should_be_sent(ledger) {
            debug!(request = %entry.request, kind = entry.tutor.kind(), "request moot");
            return TutorStep::Moot;
        }
        let (kind, tutor) = entry.tutor.do_recovery(ledger);
        debug!(
            request = %entry.request,
            kind = kind.label(),
            attempt = entry.attempt + 1,
            "request unconfirmed; retransmitting"
        );
        TutorStep::Retransmit(PendingRequest {
            kind,
            cause: "tutor.retry".into(),
            tutor,
            attempt: entry.attempt + 1,
        })
    }

    pub fn notify_sender(&mut self, request: RequestId, failed: bool) {
        let Some(id) = self.by_request.get(&request) else {
            return;
        };
        if let Some(entry) = self.entries.get_mut(id) {
            entry.tutor.notify_sender(failed);
        }
    }

    /// Aborts the tutor of one request.
    pub fn abort_request(&mut self, request: RequestId) -> Option<Notification> {
        let id = self.by_request.remove(&request)?;
        let mut entry = self.entries.remove(&id)?;
        entry.tutor.notify_abort()
    }

    /// Aborts every tutor matching `pred`.
    pub fn abort_where(
        &mut self,
        ledger: &mut RequestLedger,
        pred: impl Fn(&dyn Tutor) -> bool,
    ) -> Vec<Notification> {
        let ids: Vec<TutorId> = self
            .entries
            .iter()
            .filter(|(_, e)| pred(e.tutor.as_ref()))
            .map(|(id, _)| *id)
            .collect();
        let mut out = Vec::new();
        for id in ids {
            if let Some(mut entry) = self.entries.remove(&id) {
                self.by_request.remove(&entry.request);
                ledger.forget(entry.request);
                out.extend(entry.tutor.notify_abort());
            }
        }
        out
    }

    pub fn abort_all(&mut self, ledger: &mut RequestLedger) -> Vec<Notification> {
        self.abort_where(ledger, |_| true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn timeout_for(tutor: &dyn Tutor, attempt: u32, base: Duration) -> Duration {
    if let Some(fixed) = tutor.fixed_timeout() {
        return fixed;
    }
    base.saturating_mul(1u32 << attempt.min(16)).min(MAX_TIMEOUT)
}
