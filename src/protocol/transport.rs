//! # Physical transport contract
//!
//! The core never touches sockets. It hands stamped [`ControlRequest`]s to a
//! [`Transport`] and learns about the outside world through an
//! [`InboundSink`]: decoded server events, stream failures, and the outcome
//! of each send.
//!
//! ## Contract
//! - `send` is awaited on a task of its own; it may take as long as the
//!   network needs without stalling the client.
//! - For stream-opening requests (create/bind/recover) the transport tags
//!   every event of that stream with `request.conn`.
//! - An `Err` from `send` is reported as a failure of `request.conn` for
//!   stream-opening requests, and as a failed send otherwise.
//! - `close(conn)` releases whatever backs that stream; late events for it
//!   are ignored by the core anyway.
//!
//! ```text
//!   core ── Send(ControlRequest) ──► Transport::send ──► wire
//!    ▲                                    │
//!    └──────── InboundSink::push ◄────────┘ (events tagged with conn)
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::ids::ConnectionId;
use super::inbound::{Inbound, ServerEvent};
use super::request::ControlRequest;
use crate::core::Command;
use crate::error::TransportError;

/// Contract for the physical connection layer (WebSocket / HTTP).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Puts one request on the wire.
    ///
    /// # Parameters
    /// - `request`: the stamped request, with the mode flags to send it with
    /// - `inbound`: where to push events read back from the wire
    async fn send(&self, request: ControlRequest, inbound: InboundSink) -> Result<(), TransportError>;

    /// Releases the stream `conn`.
    async fn close(&self, conn: ConnectionId);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Cloneable handle feeding the client's serialized event queue.
#[derive(Clone, Debug)]
pub struct InboundSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl InboundSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    /// Enqueues one inbound signal. Returns `false` once the client has stopped.
    pub fn push(&self, inbound: Inbound) -> bool {
        self.tx.send(Command::Inbound(inbound)).is_ok()
    }

    /// Shorthand for pushing a decoded event of stream `conn`.
    pub fn event(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        self.push(Inbound::Event { conn, event })
    }

    /// Reports a host network availability change.
    pub fn network(&self, online: bool) -> bool {
        self.push(Inbound::Network { online })
    }
}
