//! Inbound server events and transport signals.

use std::sync::Arc;
use std::time::Duration;

use super::ids::{ConnectionId, RequestId, SessionId, SubscriptionId};
use super::request::{Bandwidth, Frequency, MessageSequence};
use crate::error::TransportError;

/// Payload of a session acknowledgment.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionOk {
    pub session_id: SessionId,
    /// Maximum number of bytes the server accepts per control request.
    pub request_limit: Option<u64>,
    /// Keepalive interval the server will use on this stream.
    pub keepalive: Option<Duration>,
    /// Address to send further requests to, when it differs from the configured one.
    pub control_link: Option<Arc<str>>,
}

impl ConnectionOk {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            request_limit: None,
            keepalive: None,
            control_link: None,
        }
    }
}

/// Why the server ended a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndCause {
    /// The session timed out on the server; a fresh one may be created.
    Expired,
    /// The server closed the session; a fresh one may be created.
    Closed,
    /// Another client took the session over. Terminal.
    TakenOver { code: i32, message: String },
}

/// Data delivered to collaborators.
///
/// Server-originated variants count towards the session's data progress.
/// [`MessageAborted`](Notification::MessageAborted) and
/// [`RequestRejected`](Notification::RequestRejected) are produced locally
/// and do not.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Update {
        subscription: SubscriptionId,
        item: u32,
        values: Vec<Option<Arc<str>>>,
    },
    EndOfSnapshot {
        subscription: SubscriptionId,
        item: u32,
    },
    ClearSnapshot {
        subscription: SubscriptionId,
        item: u32,
    },
    Overflow {
        subscription: SubscriptionId,
        item: u32,
        lost: u64,
    },
    SubscriptionOk {
        subscription: SubscriptionId,
    },
    Unsubscribed {
        subscription: SubscriptionId,
    },
    Reconfigured {
        subscription: SubscriptionId,
        frequency: Frequency,
    },
    MessageDone {
        sequence: MessageSequence,
        prog: u64,
        response: Option<Arc<str>>,
    },
    MessageFailed {
        sequence: MessageSequence,
        prog: u64,
        code: i32,
        message: String,
    },
    /// A message will not be retried any more.
    MessageAborted {
        sequence: MessageSequence,
        prog: u64,
        /// Whether the request ever left the client.
        sent: bool,
    },
    /// The server refused a control request.
    RequestRejected {
        request: RequestId,
        code: i32,
        message: String,
    },
}

impl Notification {
    /// Whether the notification came from the server stream.
    pub fn is_from_server(&self) -> bool {
        !matches!(
            self,
            Notification::MessageAborted { .. } | Notification::RequestRejected { .. }
        )
    }
}

/// Event decoded from a stream or a control response.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// Session (create/recover) or stream (bind) acknowledged.
    ConnectionOk(ConnectionOk),
    Notification(Notification),
    /// Probe sent by the server on an otherwise idle stream.
    Keepalive,
    /// The server ended the stream; a new bind is expected after `pause`.
    Loop { pause: Duration },
    /// Time the stream has been open on the server side.
    Sync { elapsed: Duration },
    /// The server does not recognise the session clock. A fresh session is needed.
    SyncError,
    /// Number of data notifications the server sent before this stream.
    Progress { count: u64 },
    /// Bandwidth actually applied by the server.
    Constrain { bandwidth: Bandwidth },
    /// Address of the client as seen by the server.
    ClientIp(Arc<str>),
    RequestOk { request: RequestId },
    RequestError {
        request: RequestId,
        code: i32,
        message: String,
    },
    End(EndCause),
    /// Non-recoverable server error.
    Error { code: i32, message: String },
    /// The stream was cut mid-way without an end marker.
    Interrupted,
}

impl ServerEvent {
    pub fn label(&self) -> &'static str {
        match self {
            ServerEvent::ConnectionOk(_) => "conok",
            ServerEvent::Notification(_) => "notification",
            ServerEvent::Keepalive => "probe",
            ServerEvent::Loop { .. } => "loop",
            ServerEvent::Sync { .. } => "sync",
            ServerEvent::SyncError => "sync_error",
            ServerEvent::Progress { .. } => "prog",
            ServerEvent::Constrain { .. } => "cons",
            ServerEvent::ClientIp(_) => "clientip",
            ServerEvent::RequestOk { .. } => "reqok",
            ServerEvent::RequestError { .. } => "reqerr",
            ServerEvent::End(_) => "end",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Interrupted => "interrupted",
        }
    }
}

/// Everything the transport (or the host) reports back into the client.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A decoded event received on stream `conn`.
    Event { conn: ConnectionId, event: ServerEvent },
    /// Stream `conn` failed.
    Failed {
        conn: ConnectionId,
        error: TransportError,
    },
    /// Stream `conn` was closed by the peer.
    Closed { conn: ConnectionId },
    /// Outcome of handing a request to the wire.
    Sent { request: RequestId, failed: bool },
    /// Host network availability changed.
    Network { online: bool },
}
