//! # Session layer.
//!
//! - [`SessionState`] / [`Phase`]: lifecycle of one session instance and its epoch token.
//! - [`Effect`] / [`Timer`]: the output of the synchronous core.
//! - [`ConnectionStatus`]: user-visible status derived from the session.
//!
//! The machine itself and its execution context stay crate-private; the
//! orchestrator is the only driver.

mod context;
mod machine;
mod state;
mod status;

pub(crate) use context::{Context, Notice};
pub(crate) use machine::{Session, SessionParams};

pub use context::{Effect, SessionTimeout, TimeoutKind, Timer, TransportAvailability};
pub use state::{Phase, SessionState};
pub use status::ConnectionStatus;
