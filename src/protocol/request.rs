//! Outgoing control requests.
//!
//! A [`ControlRequest`] is what the core hands to the [`Transport`](crate::Transport):
//! a fully stamped message (id, stream, target address, session) plus the
//! transport-mode flags it must be sent with. Encoding it on the wire is the
//! transport's job.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::ids::{ConnectionId, RequestId, SessionId, SubscriptionId};

/// Maximum bandwidth the client asks the server to respect.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Bandwidth {
    #[default]
    Unlimited,
    /// Kilobits per second.
    Limited(f64),
}

/// Maximum update frequency for a subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Frequency {
    #[default]
    Unlimited,
    Unfiltered,
    /// Updates per second.
    Limited(f64),
}

/// Delivery sequence of a client message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MessageSequence {
    /// No ordering; each message is acknowledged on its own.
    #[default]
    Unordered,
    /// Messages of the same sequence are processed in order by the server;
    /// an outcome for message `N` implies all earlier ones were received.
    Named(Arc<str>),
}

impl MessageSequence {
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        MessageSequence::Named(name.into())
    }
}

/// Subscription parameters, opaque to the core.
pub type Params = BTreeMap<String, String>;

/// What a request asks the server to do.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestKind {
    /// Open a new logical session (optionally replacing `old_session`).
    Create {
        old_session: Option<SessionId>,
        bandwidth: Bandwidth,
    },
    /// Attach a new stream to the current session.
    Bind,
    /// Attach a new stream and replay everything after `progress` notifications.
    Recover { progress: u64 },
    /// Ask the server to end the current stream so a new one can be bound.
    ForceRebind,
    /// Close the logical session on the server.
    Destroy,
    Constrain {
        bandwidth: Bandwidth,
        fence: u64,
    },
    Subscribe {
        subscription: SubscriptionId,
        params: Params,
    },
    Unsubscribe {
        subscription: SubscriptionId,
    },
    Reconfigure {
        subscription: SubscriptionId,
        reconf: u64,
        frequency: Frequency,
    },
    Message {
        sequence: MessageSequence,
        prog: u64,
        body: Arc<str>,
        ack: bool,
    },
    /// Reverse heartbeat, keeps idle intermediaries from dropping the session.
    Heartbeat,
}

impl RequestKind {
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Create { .. } => "create",
            RequestKind::Bind => "bind",
            RequestKind::Recover { .. } => "recover",
            RequestKind::ForceRebind => "force_rebind",
            RequestKind::Destroy => "destroy",
            RequestKind::Constrain { .. } => "constrain",
            RequestKind::Subscribe { .. } => "subscribe",
            RequestKind::Unsubscribe { .. } => "unsubscribe",
            RequestKind::Reconfigure { .. } => "reconfigure",
            RequestKind::Message { .. } => "message",
            RequestKind::Heartbeat => "heartbeat",
        }
    }

    /// Whether the request opens a stream (and so a [`ConnectionId`] of its own).
    pub fn opens_stream(&self) -> bool {
        matches!(
            self,
            RequestKind::Create { .. } | RequestKind::Bind | RequestKind::Recover { .. }
        )
    }
}

/// Transport-mode flags a request is sent with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestFlags {
    pub polling: bool,
    pub http: bool,
    /// Keepalive interval the client would like the server to use.
    pub keepalive_hint: Option<Duration>,
    /// How long a polling request may wait for data.
    pub idle_timeout: Option<Duration>,
    pub polling_interval: Option<Duration>,
    /// Reverse heartbeat interval the server may expect.
    pub inactivity: Option<Duration>,
}

/// A fully stamped request ready for the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlRequest {
    pub id: RequestId,
    /// Stream the request belongs to. For stream-opening requests this is
    /// the id inbound traffic must be tagged with.
    pub conn: ConnectionId,
    pub address: Arc<str>,
    pub session_id: Option<SessionId>,
    pub cause: Arc<str>,
    pub kind: RequestKind,
    pub flags: RequestFlags,
}
