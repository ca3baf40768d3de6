//! Tutor implementations, one per request family.

use std::sync::Arc;

use super::{RequestLedger, Resolution, Tutor};
use crate::protocol::{
    Bandwidth, Frequency, MessageSequence, Notification, Params, RequestKind, SessionId,
    SubscriptionId,
};

/// Supervises a subscribe request until the server confirms the subscription.
#[derive(Debug)]
pub struct SubscribeTutor {
    subscription: SubscriptionId,
    params: Params,
}

impl SubscribeTutor {
    pub fn new(subscription: SubscriptionId, params: Params) -> Self {
        Self {
            subscription,
            params,
        }
    }
}

impl Tutor for SubscribeTutor {
    fn kind(&self) -> &'static str {
        "subscribe"
    }

    fn resolution(&self) -> Resolution {
        Resolution::Subscribe {
            subscription: self.subscription,
        }
    }

    fn verify_success(&self, ledger: &RequestLedger) -> bool {
        ledger
            .subscription(self.subscription)
            .is_some_and(|rec| rec.subscribed)
    }

    fn should_be_sent(&self, ledger: &RequestLedger) -> bool {
        ledger
            .subscription(self.subscription)
            .is_some_and(|rec| !rec.unsubscribed)
    }

    fn do_recovery(&self, _ledger: &mut RequestLedger) -> (RequestKind, Box<dyn Tutor>) {
        let kind = RequestKind::Subscribe {
            subscription: self.subscription,
            params: self.params.clone(),
        };
        (
            kind,
            Box::new(SubscribeTutor::new(self.subscription, self.params.clone())),
        )
    }

    fn concerns(&self, subscription: SubscriptionId) -> bool {
        self.subscription == subscription
    }
}

/// Supervises an unsubscribe request.
#[derive(Debug)]
pub struct UnsubscribeTutor {
    subscription: SubscriptionId,
}

impl UnsubscribeTutor {
    pub fn new(subscription: SubscriptionId) -> Self {
        Self { subscription }
    }
}

impl Tutor for UnsubscribeTutor {
    fn kind(&self) -> &'static str {
        "unsubscribe"
    }

    fn resolution(&self) -> Resolution {
        Resolution::Unsubscribe {
            subscription: self.subscription,
        }
    }

    fn verify_success(&self, ledger: &RequestLedger) -> bool {
        ledger
            .subscription(self.subscription)
            .is_some_and(|rec| rec.unsubscribed)
    }

    /// Moot once the subscription has been removed.
    fn should_be_sent(&self, ledger: &RequestLedger) -> bool {
        ledger.subscription(self.subscription).is_some()
    }

    fn do_recovery(&self, _ledger: &mut RequestLedger) -> (RequestKind, Box<dyn Tutor>) {
        (
            RequestKind::Unsubscribe {
                subscription: self.subscription,
            },
            Box::new(UnsubscribeTutor::new(self.subscription)),
        )
    }

    fn concerns(&self, subscription: SubscriptionId) -> bool {
        self.subscription == subscription
    }
}

/// Supervises a frequency change. Every retransmission gets a new
/// reconfiguration id so a late answer to an old one cannot win.
#[derive(Debug)]
pub struct ReconfigureTutor {
    subscription: SubscriptionId,
    reconf: u64,
    frequency: Frequency,
}

impl ReconfigureTutor {
    pub fn new(subscription: SubscriptionId, reconf: u64, frequency: Frequency) -> Self {
        Self {
            subscription,
            reconf,
            frequency,
        }
    }
}

impl Tutor for ReconfigureTutor {
    fn kind(&self) -> &'static str {
        "reconfigure"
    }

    fn resolution(&self) -> Resolution {
        Resolution::Reconfigure {
            subscription: self.subscription,
            reconf: self.reconf,
        }
    }

    fn verify_success(&self, ledger: &RequestLedger) -> bool {
        ledger.reconf_resolved(self.subscription, self.reconf)
    }

    fn should_be_sent(&self, ledger: &RequestLedger) -> bool {
        ledger.reconf_current(self.subscription, self.reconf)
    }

    fn do_recovery(&self, ledger: &mut RequestLedger) -> (RequestKind, Box<dyn Tutor>) {
        let reconf = ledger.next_reconf(self.subscription);
        (
            RequestKind::Reconfigure {
                subscription: self.subscription,
                reconf,
                frequency: self.frequency,
            },
            Box::new(ReconfigureTutor::new(
                self.subscription,
                reconf,
                self.frequency,
            )),
        )
    }

    fn concerns(&self, subscription: SubscriptionId) -> bool {
        self.subscription == subscription
    }
}

/// Supervises a client message until the server reports its outcome.
#[derive(Debug)]
pub struct MessageTutor {
    sequence: MessageSequence,
    prog: u64,
    body: Arc<str>,
    ack: bool,
    sent: bool,
    aborted: bool,
}

impl MessageTutor {
    pub fn new(sequence: MessageSequence, prog: u64, body: Arc<str>, ack: bool) -> Self {
        Self {
            sequence,
            prog,
            body,
            ack,
            sent: false,
            aborted: false,
        }
    }

    pub fn request_kind(&self) -> RequestKind {
        RequestKind::Message {
            sequence: self.sequence.clone(),
            prog: self.prog,
            body: Arc::clone(&self.body),
            ack: self.ack,
        }
    }
}

impl Tutor for MessageTutor {
    fn kind(&self) -> &'static str {
        "message"
    }

    fn resolution(&self) -> Resolution {
        Resolution::Message {
            sequence: self.sequence.clone(),
            prog: self.prog,
        }
    }

    fn verify_success(&self, ledger: &RequestLedger) -> bool {
        ledger.message_resolved(&self.sequence, self.prog)
    }

    fn should_be_sent(&self, _ledger: &RequestLedger) -> bool {
        !self.aborted
    }

    /// The progressive stays: the server deduplicates on it.
    fn do_recovery(&self, _ledger: &mut RequestLedger) -> (RequestKind, Box<dyn Tutor>) {
        let mut next = MessageTutor::new(
            self.sequence.clone(),
            self.prog,
            Arc::clone(&self.body),
            self.ack,
        );
        next.sent = self.sent;
        (next.request_kind(), Box::new(next))
    }

    fn notify_abort(&mut self) -> Option<Notification> {
        if self.aborted {
            return None;
        }
        self.aborted = true;
        Some(Notification::MessageAborted {
            sequence: self.sequence.clone(),
            prog: self.prog,
            sent: self.sent,
        })
    }

    fn notify_sender(&mut self, failed: bool) {
        if !failed {
            self.sent = true;
        }
    }
}

/// Supervises a request asking the server to end the current stream.
///
/// Done as soon as a new bind happened (or the session changed); moot once
/// the session no longer wants the rebind.
#[derive(Debug)]
pub struct ForceRebindTutor {
    session_id: Option<SessionId>,
    bind_count: u64,
}

impl ForceRebindTutor {
    pub fn new(session_id: Option<SessionId>, bind_count: u64) -> Self {
        Self {
            session_id,
            bind_count,
        }
    }
}

impl Tutor for ForceRebindTutor {
    fn kind(&self) -> &'static str {
        "force_rebind"
    }

    fn resolution(&self) -> Resolution {
        Resolution::ForceRebind
    }

    fn verify_success(&self, ledger: &RequestLedger) -> bool {
        let view = ledger.session();
        view.session_id != self.session_id || view.bind_count > self.bind_count
    }

    fn should_be_sent(&self, ledger: &RequestLedger) -> bool {
        ledger.session().rebind_wanted
    }

    fn do_recovery(&self, _ledger: &mut RequestLedger) -> (RequestKind, Box<dyn Tutor>) {
        (
            RequestKind::ForceRebind,
            Box::new(ForceRebindTutor::new(
                self.session_id.clone(),
                self.bind_count,
            )),
        )
    }
}

/// Supervises a bandwidth constraint. Newer constraints supersede older ones.
#[derive(Debug)]
pub struct ConstrainTutor {
    fence: u64,
    bandwidth: Bandwidth,
}

impl ConstrainTutor {
    pub fn new(fence: u64, bandwidth: Bandwidth) -> Self {
        Self { fence, bandwidth }
    }
}

impl Tutor for ConstrainTutor {
    fn kind(&self) -> &'static str {
        "constrain"
    }

    fn resolution(&self) -> Resolution {
        Resolution::Constrain { fence: self.fence }
    }

    fn verify_success(&self, ledger: &RequestLedger) -> bool {
        ledger.constrain().is_resolved(self.fence)
    }

    fn should_be_sent(&self, ledger: &RequestLedger) -> bool {
        ledger.constrain().is_current(self.fence)
    }

    fn do_recovery(&self, ledger: &mut RequestLedger) -> (RequestKind, Box<dyn Tutor>) {
        let fence = ledger.next_constrain();
        (
            RequestKind::Constrain {
                bandwidth: self.bandwidth,
                fence,
            },
            Box::new(ConstrainTutor::new(fence, self.bandwidth)),
        )
    }
}
