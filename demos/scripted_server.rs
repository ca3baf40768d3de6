//! # Example: scripted_server
//!
//! Drives a client against an in-memory server that answers every request
//! the way a well-behaved push server would.
//!
//! Demonstrates how to:
//! - Implement [`Transport`] on top of anything that can push events back.
//! - Attach the built-in [`LogWriter`] and render its output with `tracing-subscriber`.
//! - Receive data through a custom [`Collaborator`].
//!
//! ## Flow
//! ```text
//! connect() ──► create ──► CONOK, LOOP ──► bind ──► CONOK, updates...
//! subscribe() ──► subscribe ──► REQOK, SUBOK
//!                                  │
//!                                  ▼
//!                        Printer::on_notification()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example scripted_server --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pushvisor::{
    ClientBuilder, Collaborator, Config, ConnectionId, ConnectionOk, ControlRequest,
    InboundSink, LogWriter, Notification, Params, RequestKind, ServerEvent, ServerSession,
    Subscribe, SubscriptionId, Transport, TransportError,
};

const SUBSCRIPTION: SubscriptionId = SubscriptionId(1);

/// In-memory server: acknowledges sessions and streams a handful of updates.
struct ScriptedServer;

#[async_trait]
impl Transport for ScriptedServer {
    async fn send(&self, request: ControlRequest, inbound: InboundSink) -> Result<(), TransportError> {
        let conn = request.conn;
        match request.kind {
            RequestKind::Create { .. } => {
                inbound.event(conn, ServerEvent::ConnectionOk(ConnectionOk::new("S-demo")));
                inbound.event(conn, ServerEvent::Loop { pause: Duration::ZERO });
            }
            RequestKind::Bind | RequestKind::Recover { .. } => {
                inbound.event(conn, ServerEvent::ConnectionOk(ConnectionOk::new("S-demo")));
                tokio::spawn(stream_prices(conn, inbound));
            }
            RequestKind::Subscribe { subscription, .. } => {
                inbound.event(conn, ServerEvent::RequestOk { request: request.id });
                inbound.event(
                    conn,
                    ServerEvent::Notification(Notification::SubscriptionOk { subscription }),
                );
            }
            _ => {
                inbound.event(conn, ServerEvent::RequestOk { request: request.id });
            }
        }
        Ok(())
    }

    async fn close(&self, conn: ConnectionId) {
        println!("[server] stream {conn:?} closed");
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

async fn stream_prices(conn: ConnectionId, inbound: InboundSink) {
    for (item, price) in ["101.5", "101.7", "101.2"].into_iter().enumerate() {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let update = Notification::Update {
            subscription: SUBSCRIPTION,
            item: item as u32 + 1,
            values: vec![Some(Arc::from(price))],
        };
        if !inbound.event(conn, ServerEvent::Notification(update)) {
            return;
        }
    }
}

/// Prints whatever the session hands to the application.
struct Printer;

impl Collaborator for Printer {
    fn name(&self) -> &'static str {
        "printer"
    }

    fn on_session_start(&self, session: &ServerSession) {
        println!("[app] session {} started", session.session_id().as_str());
    }

    fn on_notification(&self, notification: &Notification) {
        if let Notification::Update { item, values, .. } = notification {
            let price = values.first().and_then(|v| v.as_deref()).unwrap_or("-");
            println!("[app] item {item} -> {price}");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let collaborators: Vec<Arc<dyn Collaborator>> = vec![Arc::new(Printer)];
    let client = ClientBuilder::new(Config::new("wss://push.example.com"))
        .with_transport(Arc::new(ScriptedServer))
        .with_subscribers(subscribers)
        .with_collaborators(collaborators)
        .build()?;

    client.connect()?;
    client.subscribe(SUBSCRIPTION, Params::new()).await?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    let snapshot = client.snapshot().await?;
    println!("[app] status {} over {:?}", snapshot.status, snapshot.mode);

    client.disconnect()?;
    client.shutdown().await;
    Ok(())
}
