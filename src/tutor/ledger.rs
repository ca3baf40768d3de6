//! # Request ledger
//!
//! Tutors decide whether their request needs another attempt by looking at
//! what the client has learned since sending it. [`RequestLedger`] is that
//! shared knowledge: acknowledgments, subscription states, fencing ids and
//! the current session identity.
//!
//! ## Rules
//! - An acknowledgment for reconfiguration `N` of a subscription resolves
//!   every reconfiguration `<= N` of that subscription.
//! - An outcome for message `N` of a named sequence resolves every message
//!   `<= N` of that sequence; unordered messages resolve one by one.
//! - The ledger forgets everything but the session view on [`reset`](RequestLedger::reset),
//!   which happens whenever a server session is lost for good.

use std::collections::{BTreeSet, HashMap};

use crate::policies::Fence;
use crate::protocol::{MessageSequence, Notification, RequestId, SessionId, SubscriptionId};

/// What the tutors know about the current session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionView {
    pub session_id: Option<SessionId>,
    pub bind_count: u64,
    /// The session still wants the server to end its stream.
    pub rebind_wanted: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SubscriptionRecord {
    pub subscribed: bool,
    pub unsubscribed: bool,
    pub reconf: Fence,
}

/// What acknowledging a request resolves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Subscribe { subscription: SubscriptionId },
    Unsubscribe { subscription: SubscriptionId },
    Reconfigure { subscription: SubscriptionId, reconf: u64 },
    Message { sequence: MessageSequence, prog: u64 },
    Constrain { fence: u64 },
    ForceRebind,
}

#[derive(Debug, Default)]
struct Unordered {
    next: u64,
    resolved: BTreeSet<u64>,
}

#[derive(Debug, Default)]
pub struct RequestLedger {
    session: SessionView,
    subscriptions: HashMap<SubscriptionId, SubscriptionRecord>,
    sequences: HashMap<MessageSequence, Fence>,
    unordered: Unordered,
    constrain: Fence,
    requests: HashMap<RequestId, Resolution>,
}

impl RequestLedger {
    pub fn session(&self) -> &SessionView {
        &self.session
    }

    pub(crate) fn track_session(&mut self, view: SessionView) {
        self.session = view;
    }

    /// Forgets all per-session request state.
    pub(crate) fn reset(&mut self) {
        let session = std::mem::take(&mut self.session);
        *self = Self {
            session,
            ..Self::default()
        };
    }

    /// Maps a request id to what its acknowledgment resolves.
    pub(crate) fn register(&mut self, request: RequestId, resolution: Resolution) {
        self.requests.insert(request, resolution);
    }

    /// Applies a positive acknowledgment.
    ///
    /// Returns the resolution together with whether it advanced its fence
    /// (`false` for a late acknowledgment superseded by a newer one).
    pub(crate) fn on_request_ok(&mut self, request: RequestId) -> Option<(Resolution, bool)> {
        let resolution = self.requests.remove(&request)?;
        let advanced = self.resolve(&resolution);
        Some((resolution, advanced))
    }

    /// Drops the mapping of a request that will never be acknowledged usefully:
    /// refused, superseded by a retransmission, or given up.
    pub(crate) fn forget(&mut self, request: RequestId) {
        self.requests.remove(&request);
    }

    /// Learns from a server notification.
    pub(crate) fn on_notification(&mut self, n: &Notification) {
        match n {
            Notification::SubscriptionOk { subscription } => {
                if let Some(rec) = self.subscriptions.get_mut(subscription) {
                    rec.subscribed = true;
                }
            }
            Notification::Unsubscribed { subscription } => {
                if let Some(rec) = self.subscriptions.get_mut(subscription) {
                    rec.unsubscribed = true;
                }
            }
            Notification::MessageDone { sequence, prog, .. }
            | Notification::MessageFailed { sequence, prog, .. } => {
                self.resolve(&Resolution::Message {
                    sequence: sequence.clone(),
                    prog: *prog,
                });
            }
            _ => {}
        }
    }

    fn resolve(&mut self, resolution: &Resolution) -> bool {
        match resolution {
            Resolution::Subscribe { subscription } => match self.subscriptions.get_mut(subscription) {
                Some(rec) => {
                    rec.subscribed = true;
                    true
                }
                None => false,
            },
            Resolution::Unsubscribe { subscription } => {
                match self.subscriptions.get_mut(subscription) {
                    Some(rec) => {
                        rec.unsubscribed = true;
                        true
                    }
                    None => false,
                }
            }
            Resolution::Reconfigure {
                subscription,
                reconf,
            } => self
                .subscriptions
                .get_mut(subscription)
                .is_some_and(|rec| rec.reconf.acknowledge(*reconf)),
            Resolution::Message {
                sequence: MessageSequence::Unordered,
                prog,
            } => self.unordered.resolved.insert(*prog),
            Resolution::Message { sequence, prog } => self
                .sequences
                .entry(sequence.clone())
                .or_default()
                .acknowledge(*prog),
            Resolution::Constrain { fence } => self.constrain.acknowledge(*fence),
            Resolution::ForceRebind => true,
        }
    }

    // --- subscriptions ---

    pub fn subscription(&self, id: SubscriptionId) -> Option<&SubscriptionRecord> {
        self.subscriptions.get(&id)
    }

    pub(crate) fn add_subscription(&mut self, id: SubscriptionId) {
        self.subscriptions.insert(id, SubscriptionRecord::default());
    }

    /// Drops a subscription; its pending requests become moot.
    pub(crate) fn remove_subscription(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Allocates the next reconfiguration id of a subscription.
    pub(crate) fn next_reconf(&mut self, id: SubscriptionId) -> u64 {
        self.subscriptions.entry(id).or_default().reconf.issue()
    }

    pub fn reconf_resolved(&self, id: SubscriptionId, reconf: u64) -> bool {
        self.subscriptions
            .get(&id)
            .is_some_and(|rec| rec.reconf.is_resolved(reconf))
    }

    pub fn reconf_current(&self, id: SubscriptionId, reconf: u64) -> bool {
        self.subscriptions
            .get(&id)
            .is_some_and(|rec| rec.reconf.is_current(reconf))
    }

    // --- messages ---

    /// Allocates the next progressive of a sequence.
    pub(crate) fn next_prog(&mut self, sequence: &MessageSequence) -> u64 {
        match sequence {
            MessageSequence::Unordered => {
                self.unordered.next += 1;
                self.unordered.next
            }
            named => self.sequences.entry(named.clone()).or_default().issue(),
        }
    }

    pub fn message_resolved(&self, sequence: &MessageSequence, prog: u64) -> bool {
        match sequence {
            MessageSequence::Unordered => self.unordered.resolved.contains(&prog),
            named => self
                .sequences
                .get(named)
                .is_some_and(|f| f.is_resolved(prog)),
        }
    }

    // --- bandwidth ---

    pub fn constrain(&self) -> &Fence {
        &self.constrain
    }

    pub(crate) fn next_constrain(&mut self) -> u64 {
        self.constrain.issue()
    }
}
