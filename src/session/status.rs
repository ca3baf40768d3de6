//! User-visible connection status.
//!
//! Derived on demand from the session's transport mode, state and recovery
//! flag. The value is informational; nothing in the core branches on it.

use std::fmt;

use super::state::SessionState;
use crate::orchestrator::TransportMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Connecting,
    StreamSensing,
    /// Delivering over a steady transport mode.
    Connected(TransportMode),
    Stalled,
    Disconnected,
    WillRetry,
    TryingRecovery,
}

impl ConnectionStatus {
    pub fn derive(mode: TransportMode, state: SessionState, recovering: bool) -> Self {
        if !mode.is_connected() {
            return ConnectionStatus::Disconnected;
        }
        match state {
            SessionState::Off => ConnectionStatus::Disconnected,
            SessionState::Creating if recovering => ConnectionStatus::TryingRecovery,
            SessionState::Creating => ConnectionStatus::Connecting,
            SessionState::Created | SessionState::FirstPause | SessionState::FirstBinding => {
                ConnectionStatus::StreamSensing
            }
            SessionState::Receiving
            | SessionState::Stalling
            | SessionState::Pause
            | SessionState::Binding => ConnectionStatus::Connected(mode.steady()),
            SessionState::Stalled => ConnectionStatus::Stalled,
            SessionState::Sleep if recovering => ConnectionStatus::TryingRecovery,
            SessionState::Sleep => ConnectionStatus::WillRetry,
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connected(_) | ConnectionStatus::StreamSensing
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => f.write_str("CONNECTING"),
            ConnectionStatus::StreamSensing => f.write_str("CONNECTED:STREAM-SENSING"),
            ConnectionStatus::Connected(mode) => write!(f, "CONNECTED:{}", mode.steady()),
            ConnectionStatus::Stalled => f.write_str("STALLED"),
            ConnectionStatus::Disconnected => f.write_str("DISCONNECTED"),
            ConnectionStatus::WillRetry => f.write_str("DISCONNECTED:WILL-RETRY"),
            ConnectionStatus::TryingRecovery => f.write_str("DISCONNECTED:TRYING-RECOVERY"),
        }
    }
}
