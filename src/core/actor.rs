//! # ClientActor: serialized driver of the client core.
//!
//! Owns the [`Orchestrator`] and is the only task that touches it. Every
//! input (application call, transport signal, fired timer) arrives as a
//! [`Command`] on one unbounded queue and is applied to completion before
//! the next one; the effects the core produced are then executed.
//!
//! ```text
//!  Client ─┐
//!  InboundSink ─┼─► mpsc<Command> ──► ClientActor::run()
//!  timer tasks ─┘                           │
//!                                handle(cmd) → Orchestrator
//!                                           │
//!                             execute(take_effects())
//!                     ┌─────────────────────┼─────────────────────┐
//!                     ▼                     ▼                     ▼
//!       spawn Transport::send    spawn Transport::close    spawn sleep(delay)
//!        (Err → Inbound::Failed)                            → Command::Timer
//! ```
//!
//! ## Rules
//! - Commands are applied one at a time, in queue order.
//! - Effects are executed in the order the core produced them.
//! - Cancelling the runtime token stops the loop and every pending timer.
//! - After each command the derived status is compared with the previous
//!   one; a change is published as `StatusChanged`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{ClientSnapshot, Command};
use crate::events::{Bus, Event, EventKind};
use crate::orchestrator::Orchestrator;
use crate::protocol::{ControlRequest, Inbound, InboundSink, Transport};
use crate::session::{ConnectionStatus, Effect};

pub(crate) struct ClientActor {
    core: Orchestrator,
    transport: Arc<dyn Transport>,
    tx: mpsc::UnboundedSender<Command>,
    rx: mpsc::UnboundedReceiver<Command>,
    bus: Bus,
    token: CancellationToken,
    last_status: ConnectionStatus,
}

impl ClientActor {
    pub fn new(
        core: Orchestrator,
        transport: Arc<dyn Transport>,
        tx: mpsc::UnboundedSender<Command>,
        rx: mpsc::UnboundedReceiver<Command>,
        bus: Bus,
        token: CancellationToken,
    ) -> Self {
        Self {
            core,
            transport,
            tx,
            rx,
            bus,
            token,
            last_status: ConnectionStatus::Disconnected,
        }
    }

    /// Runs until the runtime token is cancelled or every handle is gone.
    pub async fn run(mut self) {
        info!(transport = self.transport.name(), "client runtime started");
        loop {
            select! {
                _ = self.token.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }
        if self.core.status().is_connected() {
            self.core.disconnect();
            self.execute();
            self.publish_status();
        }
        info!("client runtime stopped");
    }

    fn handle(&mut self, cmd: Command) {
        trace!(command = cmd.label(), "command");
        match cmd {
            Command::Connect => self.core.connect(),
            Command::Disconnect => self.core.disconnect(),
            Command::ChangeBandwidth(bandwidth) => self.core.change_bandwidth(bandwidth),
            Command::ChangeReverseHeartbeat(interval) => {
                self.core.change_reverse_heartbeat(interval)
            }
            Command::ForceTransport(forced) => self.core.force_transport(forced),
            Command::Submit { control, reply } => {
                let receipt = self.core.submit(control);
                let _ = reply.send(receipt);
            }
            Command::RemoveSubscription(subscription) => {
                self.core.remove_subscription(subscription)
            }
            Command::SetOnline(online) => self.core.set_online(online),
            Command::Snapshot(reply) => {
                let _ = reply.send(ClientSnapshot::of(&self.core));
            }
            Command::Inbound(inbound) => self.core.handle_inbound(inbound),
            Command::Timer(timer) => self.core.fire(timer),
        }
        self.execute();
        self.publish_status();
    }

    fn execute(&mut self) {
        for effect in self.core.take_effects() {
            match effect {
                Effect::Send(request) => self.spawn_send(request),
                Effect::Close(conn) => {
                    let transport = Arc::clone(&self.transport);
                    tokio::spawn(async move { transport.close(conn).await });
                }
                Effect::Schedule { delay, timer } => {
                    let tx = self.tx.clone();
                    let token = self.token.clone();
                    tokio::spawn(async move {
                        select! {
                            _ = token.cancelled() => {}
                            _ = time::sleep(delay) => {
                                let _ = tx.send(Command::Timer(timer));
                            }
                        }
                    });
                }
            }
        }
    }

    fn spawn_send(&self, request: ControlRequest) {
        let transport = Arc::clone(&self.transport);
        let sink = InboundSink::new(self.tx.clone());
        tokio::spawn(async move {
            let id = request.id;
            let conn = request.conn;
            let opens_stream = request.kind.opens_stream();
            match transport.send(request, sink.clone()).await {
                Ok(()) => {
                    sink.push(Inbound::Sent {
                        request: id,
                        failed: false,
                    });
                }
                Err(error) => {
                    debug!(request = %id, %conn, error = %error, "send failed");
                    sink.push(Inbound::Sent {
                        request: id,
                        failed: true,
                    });
                    if opens_stream {
                        sink.push(Inbound::Failed { conn, error });
                    }
                }
            }
        });
    }

    fn publish_status(&mut self) {
        let status = self.core.connection_status();
        if status == self.last_status {
            return;
        }
        info!(from = %self.last_status, to = %status, "connection status");
        self.last_status = status;
        self.bus
            .publish(Event::new(EventKind::StatusChanged).with_reason(status.to_string()));
    }
}
