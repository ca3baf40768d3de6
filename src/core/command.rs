//! Messages serialized through the client actor.

use std::time::Duration;

use tokio::sync::oneshot;

use super::ClientSnapshot;
use crate::orchestrator::{Control, ForcedTransport, Receipt};
use crate::protocol::{Bandwidth, Inbound, SubscriptionId};
use crate::session::Timer;

/// Everything that can change the client core, in arrival order.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    ChangeBandwidth(Bandwidth),
    ChangeReverseHeartbeat(Option<Duration>),
    ForceTransport(Option<ForcedTransport>),
    Submit {
        control: Control,
        reply: oneshot::Sender<Receipt>,
    },
    RemoveSubscription(SubscriptionId),
    SetOnline(bool),
    Snapshot(oneshot::Sender<ClientSnapshot>),
    Inbound(Inbound),
    Timer(Timer),
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::Connect => "connect",
            Command::Disconnect => "disconnect",
            Command::ChangeBandwidth(_) => "change_bandwidth",
            Command::ChangeReverseHeartbeat(_) => "change_reverse_heartbeat",
            Command::ForceTransport(_) => "force_transport",
            Command::Submit { .. } => "submit",
            Command::RemoveSubscription(_) => "remove_subscription",
            Command::SetOnline(_) => "set_online",
            Command::Snapshot(_) => "snapshot",
            Command::Inbound(_) => "inbound",
            Command::Timer(_) => "timer",
        }
    }
}
