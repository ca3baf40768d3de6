//! # Collaborators: application-side consumers of session lifecycle and data.
//!
//! A [`Collaborator`] is called synchronously from the client core, in the
//! order collaborators were registered. Calls must not block; hand work off
//! to a channel or a task when it is not trivial.
//!
//! Lifecycle events for monitoring go through the event bus and
//! [`Subscribe`](crate::subscribers::Subscribe) instead.

use super::ServerSession;
use crate::protocol::Notification;

pub trait Collaborator: Send + Sync + 'static {
    /// Name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// A new server session was created.
    fn on_session_start(&self, _session: &ServerSession) {}

    /// The server session ended. `recovery_scheduled` tells whether the
    /// client will try to resume it with a fresh session right away.
    fn on_session_close(&self, _recovery_scheduled: bool) {}

    /// Data or a request outcome for the application.
    fn on_notification(&self, _notification: &Notification) {}
}
