//! Wire-level vocabulary shared by the core and the transport.
//!
//! ## Contents
//! - ids:       [`ConnectionId`], [`RequestId`], [`SessionId`], [`SubscriptionId`]
//! - requests:  [`ControlRequest`], [`RequestKind`], [`RequestFlags`]
//! - inbound:   [`ServerEvent`], [`Notification`], [`Inbound`]
//! - transport: the [`Transport`] trait and the [`InboundSink`] it reports through

mod ids;
mod inbound;
mod request;
mod transport;

pub(crate) use ids::IdSource;
pub use ids::{ConnectionId, RequestId, SessionId, SubscriptionId};
pub use inbound::{ConnectionOk, EndCause, Inbound, Notification, ServerEvent};
pub use request::{
    Bandwidth, ControlRequest, Frequency, MessageSequence, Params, RequestFlags, RequestKind,
};
pub use transport::{InboundSink, Transport};
