//! # Client handle.
//!
//! [`Client`] is a cheap handle onto the runtime spawned by
//! [`ClientBuilder::build`](super::ClientBuilder::build). Calls are queued to
//! the client actor and applied in order; the ones returning a value wait
//! for the actor's answer.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use pushvisor::{ClientBuilder, Config, ControlRequest, ConnectionId, InboundSink, Transport, TransportError};
//!
//! struct Noop;
//!
//! #[async_trait::async_trait]
//! impl Transport for Noop {
//!     async fn send(&self, _: ControlRequest, _: InboundSink) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//!     async fn close(&self, _: ConnectionId) {}
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new(Config::new("https://push.example.com"))
//!         .with_transport(Arc::new(Noop))
//!         .build()?;
//!     client.connect()?;
//!     println!("{}", client.status().await?);
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ClientBuilder, Command, Config};
use crate::error::ClientError;
use crate::events::{Bus, Event};
use crate::orchestrator::{Control, ForcedTransport, Orchestrator, Receipt, TransportMode};
use crate::protocol::{
    Bandwidth, Frequency, InboundSink, MessageSequence, Params, SessionId, SubscriptionId,
};
use crate::session::ConnectionStatus;
use crate::subscribers::SubscriberSet;

/// Point-in-time view of the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub status: ConnectionStatus,
    pub mode: TransportMode,
    pub session_id: Option<SessionId>,
    /// Notifications received on the current server session.
    pub data_count: u64,
    pub ws_available: bool,
    /// Requests queued or awaiting confirmation.
    pub outstanding_requests: usize,
}

impl ClientSnapshot {
    pub(crate) fn of(core: &Orchestrator) -> Self {
        Self {
            status: core.connection_status(),
            mode: core.status(),
            session_id: core.session_id().cloned(),
            data_count: core.data_count(),
            ws_available: core.ws_available(),
            outstanding_requests: core.queued_requests() + core.supervised_requests(),
        }
    }
}

pub struct Client {
    tx: mpsc::UnboundedSender<Command>,
    bus: Bus,
    token: CancellationToken,
    subs: Arc<SubscriberSet>,
    handle: JoinHandle<()>,
}

impl Client {
    /// Shorthand for [`ClientBuilder::new`].
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub(crate) fn new(
        tx: mpsc::UnboundedSender<Command>,
        bus: Bus,
        token: CancellationToken,
        subs: Arc<SubscriberSet>,
        handle: JoinHandle<()>,
    ) -> Self {
        Self {
            tx,
            bus,
            token,
            subs,
            handle,
        }
    }

    fn send(&self, cmd: Command) -> Result<(), ClientError> {
        self.tx.send(cmd).map_err(|_| ClientError::Closed)
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    pub fn connect(&self) -> Result<(), ClientError> {
        self.send(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.send(Command::Disconnect)
    }

    pub fn change_bandwidth(&self, bandwidth: Bandwidth) -> Result<(), ClientError> {
        self.send(Command::ChangeBandwidth(bandwidth))
    }

    /// Sets the reverse heartbeat interval; `None` or zero disables it.
    pub fn change_reverse_heartbeat(&self, interval: Option<Duration>) -> Result<(), ClientError> {
        self.send(Command::ChangeReverseHeartbeat(interval))
    }

    pub fn force_transport(&self, forced: Option<ForcedTransport>) -> Result<(), ClientError> {
        self.send(Command::ForceTransport(forced))
    }

    /// Tells the client whether the host network is available.
    pub fn set_online(&self, online: bool) -> Result<(), ClientError> {
        self.send(Command::SetOnline(online))
    }

    pub async fn subscribe(
        &self,
        subscription: SubscriptionId,
        params: Params,
    ) -> Result<Receipt, ClientError> {
        self.submit(Control::Subscribe {
            subscription,
            params,
        })
        .await
    }

    pub async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<Receipt, ClientError> {
        self.submit(Control::Unsubscribe { subscription }).await
    }

    /// Changes the update frequency of a subscription; the receipt carries
    /// the reconfiguration id.
    pub async fn reconfigure(
        &self,
        subscription: SubscriptionId,
        frequency: Frequency,
    ) -> Result<Receipt, ClientError> {
        self.submit(Control::Reconfigure {
            subscription,
            frequency,
        })
        .await
    }

    /// Sends a message; the receipt carries its progressive in the sequence.
    pub async fn send_message(
        &self,
        sequence: MessageSequence,
        body: impl Into<Arc<str>>,
        ack: bool,
    ) -> Result<Receipt, ClientError> {
        self.submit(Control::Message {
            sequence,
            body: body.into(),
            ack,
        })
        .await
    }

    pub async fn submit(&self, control: Control) -> Result<Receipt, ClientError> {
        self.ask(|reply| Command::Submit { control, reply }).await
    }

    /// Forgets a subscription locally; its unconfirmed requests are given up.
    pub fn remove_subscription(&self, subscription: SubscriptionId) -> Result<(), ClientError> {
        self.send(Command::RemoveSubscription(subscription))
    }

    pub async fn snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        self.ask(Command::Snapshot).await
    }

    pub async fn status(&self) -> Result<ConnectionStatus, ClientError> {
        Ok(self.snapshot().await?.status)
    }

    /// Subscribes to the runtime event stream.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Handle for pushing inbound signals from outside a transport (e.g. network monitors).
    pub fn inbound(&self) -> InboundSink {
        InboundSink::new(self.tx.clone())
    }

    /// Stops the runtime, disconnecting first if needed, and drains subscribers.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
        drop(self.tx);
        if let Ok(subs) = Arc::try_unwrap(self.subs) {
            subs.shutdown().await;
        }
    }
}
