//! # pushvisor
//!
//! **Pushvisor** is the connection core of a real-time push client.
//!
//! It keeps a logical server session alive over a physical stream that can
//! break, stall or be swapped: it creates, binds and recovers sessions,
//! switches between WebSocket and HTTP streaming/polling, backs off on
//! failures, and retransmits control requests until the server confirms
//! them. Sockets stay outside: a [`Transport`] implementation moves bytes
//! and reports back through an [`InboundSink`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Client (handle) ──┐       Transport ── InboundSink ──┐
//!                     ▼                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ClientActor (single task, one queue of commands)                 │
//! │                                                                   │
//! │   Orchestrator ── owns ──► Session (state machine, one stream)    │
//! │     - TransportMode / Phase            - RetryBackoff             │
//! │     - ServerSession                    - RecoveryBudget           │
//! │     - Collaborators                    - TutorTable + Ledger      │
//! │                                                                   │
//! │   produces Effects: Send(request) · Close(conn) · Schedule(timer) │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   Transport::send    Transport::close     sleep → Command::Timer
//!
//!   Session / Orchestrator ──► Bus (broadcast) ──► SubscriberSet
//!                                                  ┌──────┼──────┐
//!                                                  ▼      ▼      ▼
//!                                               worker1 worker2 workerN
//! ```
//!
//! ### Session lifecycle
//! ```text
//! Off ─► Creating ─► Created ─► FirstBinding ─► Receiving ◄─┐
//!          ▲  (CONOK)  │ polling loop │          │   ▲       │
//!          │           ▼              │          ▼   │ data  │
//!          │       FirstPause ────────┘       Stalling ─► Stalled
//!          │                                     │
//!          │     Pause ◄── LOOP ── Receiving     └─ silence ─► recover / retry
//!          │       └──► Binding ──► Receiving
//!          └──── Sleep (retry timer, offline gate)
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                       |
//! |-------------------|-------------------------------------------------------------------|------------------------------------------|
//! | **Client**        | Build, connect, subscribe, send messages, observe status.         | [`Client`], [`ClientBuilder`], [`Config`]|
//! | **Transport**     | Plug in the physical connection layer.                            | [`Transport`], [`InboundSink`]           |
//! | **Switching**     | Transport modes, forced transports, status derivation.            | [`TransportMode`], [`ForcedTransport`]   |
//! | **Collaborators** | Receive session lifecycle and server notifications.               | [`Collaborator`], [`Notification`]       |
//! | **Subscriber API**| Observe runtime events (logging, metrics).                        | [`Subscribe`], [`Event`]                 |
//! | **Policies**      | Backoff, jitter, recovery budget, offline gate, lag estimation.   | [`RetryBackoff`], [`JitterPolicy`]       |
//! | **Errors**        | Typed errors for the handle, the transport and the server.        | [`ClientError`], [`TransportError`]      |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use pushvisor::{
//!     ClientBuilder, Config, ConnectionId, ControlRequest, InboundSink, Params, SubscriptionId,
//!     Transport, TransportError,
//! };
//!
//! struct MyTransport;
//!
//! #[async_trait::async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&self, request: ControlRequest, inbound: InboundSink) -> Result<(), TransportError> {
//!         // encode `request` and write it; decode replies and push them to `inbound`
//!         let _ = (request, inbound);
//!         Ok(())
//!     }
//!     async fn close(&self, _conn: ConnectionId) {}
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn pushvisor::Subscribe>> = vec![Arc::new(pushvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn pushvisor::Subscribe>> = Vec::new();
//!
//!     let client = ClientBuilder::new(Config::new("https://push.example.com"))
//!         .with_transport(Arc::new(MyTransport))
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     client.connect()?;
//!     let receipt = client.subscribe(SubscriptionId(1), Params::default()).await?;
//!     println!("submitted {receipt:?}");
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod orchestrator;
mod policies;
mod protocol;
mod session;
mod subscribers;
mod tutor;

// ---- Public re-exports ----

pub use core::{Client, ClientBuilder, ClientSnapshot, Config, DEFAULT_KEEPALIVE};
pub use error::{ClientError, ServerRejection, SwitchError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use orchestrator::{
    Collaborator, Control, ForcedTransport, Orchestrator, Receipt, ServerSession, TransportMode,
    UnknownTransport,
};
pub use policies::{
    AdaptiveDelayEstimator, GateDecision, GateToken, JitterPolicy, OfflineGate, RecoveryBudget,
    RetryBackoff, Verdict,
};
pub use protocol::{
    Bandwidth, ConnectionId, ConnectionOk, ControlRequest, EndCause, Frequency, Inbound,
    InboundSink, MessageSequence, Notification, Params, RequestFlags, RequestId, RequestKind,
    ServerEvent, SessionId, SubscriptionId, Transport,
};
pub use session::{
    ConnectionStatus, Effect, Phase, SessionState, SessionTimeout, TimeoutKind, Timer,
    TransportAvailability,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
