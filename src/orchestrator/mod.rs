//! # Orchestration of session instances across transports.
//!
//! - [`TransportMode`] / [`ForcedTransport`]: what the client runs on and what it may run on.
//! - [`Orchestrator`]: the synchronous client core.
//! - [`ServerSession`]: server-side identity seen by collaborators.
//! - [`Collaborator`]: application hook for session lifecycle and data.
//! - [`Control`] / [`Receipt`]: tutored application operations.

mod collaborator;
mod control;
mod manager;
mod mode;
mod server_session;

pub use collaborator::Collaborator;
pub use control::{Control, Receipt};
pub use manager::Orchestrator;
pub use mode::{ForcedTransport, TransportMode, UnknownTransport};
pub use server_session::ServerSession;
