use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{actor::ClientActor, Client, Config};
use crate::error::ClientError;
use crate::events::Bus;
use crate::orchestrator::{Collaborator, Orchestrator};
use crate::protocol::Transport;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Client`].
pub struct ClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    collaborators: Vec<Arc<dyn Collaborator>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ClientBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            collaborators: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Sets the physical connection layer. Required.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the application-side consumers of session lifecycle and data.
    pub fn with_collaborators(mut self, collaborators: Vec<Arc<dyn Collaborator>>) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (status changes, retries,
    /// switches, request outcomes) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the client and spawns its runtime.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Result<Client, ClientError> {
        let transport = self.transport.ok_or(ClientError::MissingTransport)?;
        let bus = Bus::new(self.config.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let token = CancellationToken::new();
        subscriber_listener(&bus, Arc::clone(&subs), token.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let core = Orchestrator::new(self.config, bus.clone()).with_collaborators(self.collaborators);
        let actor = ClientActor::new(core, transport, tx.clone(), rx, bus.clone(), token.clone());
        let handle = tokio::spawn(actor.run());

        Ok(Client::new(tx, bus, token, subs, handle))
    }
}

/// Forwards bus events to the subscriber set until the runtime stops.
fn subscriber_listener(bus: &Bus, subs: Arc<SubscriberSet>, token: CancellationToken) {
    if subs.is_empty() {
        return;
    }
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                ev = rx.recv() => match ev {
                    Ok(ev) => subs.emit(&ev),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}
