//! Error types used by the pushvisor runtime and its collaborators.
//!
//! - [`ClientError`]      errors surfaced by the [`Client`](crate::Client) handle.
//! - [`TransportError`]   failures reported by a [`Transport`](crate::Transport) implementation.
//! - [`SwitchError`]      an impossible transport transition was requested.
//! - [`ServerRejection`]  the server refused or terminated the session for good.
//!
//! Each type offers `as_label()` (stable snake_case, for logs/metrics) and
//! `as_message()`.

use thiserror::Error;

use crate::orchestrator::TransportMode;

/// # Errors produced by the client handle.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The runtime task has stopped; the handle is no longer usable.
    #[error("client runtime has stopped")]
    Closed,

    /// [`ClientBuilder::build`](crate::ClientBuilder::build) was called without a transport.
    #[error("no transport configured")]
    MissingTransport,
}

impl ClientError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use pushvisor::ClientError;
    ///
    /// assert_eq!(ClientError::Closed.as_label(), "client_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ClientError::Closed => "client_closed",
            ClientError::MissingTransport => "client_missing_transport",
        }
    }

    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Failures of the physical connection.
///
/// The distinction between [`Unopenable`](TransportError::Unopenable) and the
/// rest matters: a WebSocket that could not even be opened disables WebSocket
/// for the rest of the client's life (until the client address changes).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established at all.
    #[error("connection could not be opened: {reason}")]
    Unopenable { reason: String },

    /// An established connection broke.
    #[error("connection broken: {reason}")]
    Broken { reason: String },

    /// The transport was shut down.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Unopenable { .. } => "transport_unopenable",
            TransportError::Broken { .. } => "transport_broken",
            TransportError::Closed => "transport_closed",
        }
    }

    pub fn as_message(&self) -> String {
        match self {
            TransportError::Unopenable { reason } => format!("unable to open: {reason}"),
            TransportError::Broken { reason } => format!("broken: {reason}"),
            TransportError::Closed => "closed".to_string(),
        }
    }

    /// Whether the connection never got established.
    pub fn unable_to_open(&self) -> bool {
        matches!(self, TransportError::Unopenable { .. })
    }
}

/// # Invalid transport transition.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchError {
    /// Slowing down is only possible from a streaming mode.
    #[error("cannot slow down from {from}: not a streaming mode")]
    NotStreaming { from: TransportMode },
}

impl SwitchError {
    pub fn as_label(&self) -> &'static str {
        match self {
            SwitchError::NotStreaming { .. } => "switch_not_streaming",
        }
    }
}

/// # Terminal refusal from the server.
///
/// Raised when the server rejects a create, terminates the session because
/// another client took it over, or reports a non-recoverable error. The
/// client stops retrying and reports `DISCONNECTED`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("server rejected session ({code}): {message}")]
pub struct ServerRejection {
    pub code: i32,
    pub message: String,
}

impl ServerRejection {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn as_label(&self) -> &'static str {
        "server_rejection"
    }

    pub fn as_message(&self) -> String {
        format!("code {}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unable_to_open_only_for_unopenable() {
        let e = TransportError::Unopenable {
            reason: "refused".into(),
        };
        assert!(e.unable_to_open());
        assert!(
            !TransportError::Broken {
                reason: "reset".into()
            }
            .unable_to_open()
        );
        assert!(!TransportError::Closed.unable_to_open());
    }

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(ClientError::MissingTransport.as_label(), "client_missing_transport");
        assert_eq!(TransportError::Closed.as_label(), "transport_closed");
        let s = SwitchError::NotStreaming {
            from: TransportMode::PollingHttp,
        };
        assert_eq!(s.as_label(), "switch_not_streaming");
        assert_eq!(s.to_string(), "cannot slow down from HTTP-POLLING: not a streaming mode");
    }

    #[test]
    fn test_rejection_message() {
        let r = ServerRejection::new(41, "taken over");
        assert_eq!(r.as_message(), "code 41: taken over");
        assert_eq!(r.to_string(), "server rejected session (41): taken over");
    }
}
