//! # Event observers
//!
//! A [`Subscribe`] implementation watches the connection from the outside:
//! status transitions, scheduled retries and recoveries, transport switches,
//! control requests going out and coming back. It never influences the
//! client; it only sees what already happened.
//!
//! Delivery runs on a worker of its own behind a bounded queue kept by the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet):
//! - a slow observer delays nobody but itself;
//! - when its queue is full the event is dropped for that observer only,
//!   and a `SubscriberOverflow` event reports the loss.
//!
//! ```rust
//! use pushvisor::{Event, EventKind, Subscribe};
//!
//! struct StatusMirror;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for StatusMirror {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::StatusChanged {
//!             println!("status: {}", ev.reason.as_deref().unwrap_or("?"));
//!         }
//!     }
//!
//!     fn queue_capacity(&self) -> usize {
//!         16
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Called once per event, in publication order.
    async fn on_event(&self, event: &Event);

    /// Name reported in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered for this observer before new ones are dropped.
    fn queue_capacity(&self) -> usize {
        256
    }
}
