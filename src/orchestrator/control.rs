//! Application operations that travel as tutored control requests.

use std::sync::Arc;

use crate::protocol::{Frequency, MessageSequence, Params, SubscriptionId};

#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    Subscribe {
        subscription: SubscriptionId,
        params: Params,
    },
    Unsubscribe {
        subscription: SubscriptionId,
    },
    /// Changes the maximum update frequency of a subscription.
    Reconfigure {
        subscription: SubscriptionId,
        frequency: Frequency,
    },
    Message {
        sequence: MessageSequence,
        body: Arc<str>,
        /// Whether the server should confirm processing.
        ack: bool,
    },
}

/// Identifiers assigned to a submitted operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Receipt {
    Subscription(SubscriptionId),
    Reconfiguration {
        subscription: SubscriptionId,
        reconf: u64,
    },
    Message {
        sequence: MessageSequence,
        prog: u64,
    },
}
