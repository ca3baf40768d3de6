//! Client lifecycle events.
//!
//! - [`Event`] / [`EventKind`]: what happened, with optional metadata
//! - [`Bus`]: non-blocking broadcast channel the core publishes on

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
