//! # Transport modes and fallback ladders.
//!
//! A session streams or polls, over WebSocket or HTTP. The orchestrator
//! status is one of those four steady modes, the matching *switching*
//! variant while an in-place switch is pending, or one of the three
//! non-connected values.
//!
//! ## Transport sensing
//! ```text
//! WS-STREAMING   ─► HTTP-STREAMING   (stays if frozen)
//! HTTP-STREAMING ─► HTTP-POLLING
//! WS-POLLING     ─► WS-STREAMING
//! HTTP-POLLING   ─► WS-STREAMING     (stays if frozen)
//! ```
//!
//! ## Slowing down
//! Only `WS-STREAMING ─► WS-POLLING` and `HTTP-STREAMING ─► HTTP-POLLING`.

use std::fmt;
use std::str::FromStr;

use crate::error::SwitchError;

/// Orchestrator status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportMode {
    Off,
    StreamingWs,
    SwitchingStreamingWs,
    PollingWs,
    SwitchingPollingWs,
    StreamingHttp,
    SwitchingStreamingHttp,
    PollingHttp,
    SwitchingPollingHttp,
    /// Disconnected on request or after a terminal server refusal.
    End,
    /// Disconnected after a protocol violation.
    Error,
}

impl TransportMode {
    /// Steady mode for the given pair.
    pub fn steady_for(polling: bool, http: bool) -> Self {
        match (polling, http) {
            (false, false) => TransportMode::StreamingWs,
            (true, false) => TransportMode::PollingWs,
            (false, true) => TransportMode::StreamingHttp,
            (true, true) => TransportMode::PollingHttp,
        }
    }

    /// Whether the mode (or the switch target) polls.
    pub fn is_polling(self) -> bool {
        matches!(
            self,
            TransportMode::PollingWs
                | TransportMode::SwitchingPollingWs
                | TransportMode::PollingHttp
                | TransportMode::SwitchingPollingHttp
        )
    }

    /// Whether the mode (or the switch target) uses HTTP.
    pub fn is_http(self) -> bool {
        matches!(
            self,
            TransportMode::StreamingHttp
                | TransportMode::SwitchingStreamingHttp
                | TransportMode::PollingHttp
                | TransportMode::SwitchingPollingHttp
        )
    }

    /// Whether the mode (or the switch target) uses WebSocket.
    pub fn is_ws(self) -> bool {
        matches!(
            self,
            TransportMode::StreamingWs
                | TransportMode::SwitchingStreamingWs
                | TransportMode::PollingWs
                | TransportMode::SwitchingPollingWs
        )
    }

    pub fn is_switching(self) -> bool {
        matches!(
            self,
            TransportMode::SwitchingStreamingWs
                | TransportMode::SwitchingPollingWs
                | TransportMode::SwitchingStreamingHttp
                | TransportMode::SwitchingPollingHttp
        )
    }

    /// Whether a session is supposed to exist.
    pub fn is_connected(self) -> bool {
        !matches!(
            self,
            TransportMode::Off | TransportMode::End | TransportMode::Error
        )
    }

    /// The steady mode: the switch target for switching variants, `self` otherwise.
    pub fn steady(self) -> Self {
        match self {
            TransportMode::SwitchingStreamingWs => TransportMode::StreamingWs,
            TransportMode::SwitchingPollingWs => TransportMode::PollingWs,
            TransportMode::SwitchingStreamingHttp => TransportMode::StreamingHttp,
            TransportMode::SwitchingPollingHttp => TransportMode::PollingHttp,
            other => other,
        }
    }

    /// The switching variant of a steady mode; `self` otherwise.
    pub fn switching(self) -> Self {
        match self {
            TransportMode::StreamingWs => TransportMode::SwitchingStreamingWs,
            TransportMode::PollingWs => TransportMode::SwitchingPollingWs,
            TransportMode::StreamingHttp => TransportMode::SwitchingStreamingHttp,
            TransportMode::PollingHttp => TransportMode::SwitchingPollingHttp,
            other => other,
        }
    }

    /// Next mode to try when the current one does not work.
    ///
    /// When `frozen`, WebSocket streaming and HTTP polling stay where they are.
    /// Non-connected values start the ladder at WebSocket streaming.
    pub fn next_sense(self, frozen: bool) -> Self {
        match self.steady() {
            TransportMode::StreamingWs if frozen => TransportMode::StreamingWs,
            TransportMode::StreamingWs => TransportMode::StreamingHttp,
            TransportMode::StreamingHttp => TransportMode::PollingHttp,
            TransportMode::PollingWs => TransportMode::StreamingWs,
            TransportMode::PollingHttp if frozen => TransportMode::PollingHttp,
            TransportMode::PollingHttp => TransportMode::StreamingWs,
            _ => TransportMode::StreamingWs,
        }
    }

    /// Polling mode of the same family, for a stream that cannot keep up.
    pub fn next_slow(self) -> Result<Self, SwitchError> {
        match self {
            TransportMode::StreamingWs => Ok(TransportMode::PollingWs),
            TransportMode::StreamingHttp => Ok(TransportMode::PollingHttp),
            from => Err(SwitchError::NotStreaming { from }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportMode::Off => "OFF",
            TransportMode::StreamingWs => "WS-STREAMING",
            TransportMode::SwitchingStreamingWs => "SWITCHING:WS-STREAMING",
            TransportMode::PollingWs => "WS-POLLING",
            TransportMode::SwitchingPollingWs => "SWITCHING:WS-POLLING",
            TransportMode::StreamingHttp => "HTTP-STREAMING",
            TransportMode::SwitchingStreamingHttp => "SWITCHING:HTTP-STREAMING",
            TransportMode::PollingHttp => "HTTP-POLLING",
            TransportMode::SwitchingPollingHttp => "SWITCHING:HTTP-POLLING",
            TransportMode::End => "END",
            TransportMode::Error => "ERROR",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restriction on transport selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForcedTransport {
    /// WebSocket only; streaming or polling.
    Ws,
    /// HTTP only; streaming or polling.
    Http,
    WsStreaming,
    HttpStreaming,
    WsPolling,
    HttpPolling,
}

impl ForcedTransport {
    /// The exact mode, when one is forced.
    pub fn exact(self) -> Option<TransportMode> {
        match self {
            ForcedTransport::WsStreaming => Some(TransportMode::StreamingWs),
            ForcedTransport::HttpStreaming => Some(TransportMode::StreamingHttp),
            ForcedTransport::WsPolling => Some(TransportMode::PollingWs),
            ForcedTransport::HttpPolling => Some(TransportMode::PollingHttp),
            ForcedTransport::Ws | ForcedTransport::Http => None,
        }
    }

    /// Whether fallback is frozen to a single mode.
    pub fn is_frozen(self) -> bool {
        self.exact().is_some()
    }

    pub fn is_http(self) -> bool {
        matches!(
            self,
            ForcedTransport::Http | ForcedTransport::HttpStreaming | ForcedTransport::HttpPolling
        )
    }

    /// Whether `mode` satisfies the restriction.
    pub fn allows(self, mode: TransportMode) -> bool {
        match self.exact() {
            Some(exact) => mode.steady() == exact,
            None => mode.is_http() == self.is_http(),
        }
    }

    /// Closest mode to `mode` that satisfies the restriction.
    pub fn constrain(self, mode: TransportMode) -> TransportMode {
        if self.allows(mode) {
            return mode.steady();
        }
        match self.exact() {
            Some(exact) => exact,
            None => TransportMode::steady_for(mode.is_polling(), self.is_http()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ForcedTransport::Ws => "WS",
            ForcedTransport::Http => "HTTP",
            ForcedTransport::WsStreaming => "WS-STREAMING",
            ForcedTransport::HttpStreaming => "HTTP-STREAMING",
            ForcedTransport::WsPolling => "WS-POLLING",
            ForcedTransport::HttpPolling => "HTTP-POLLING",
        }
    }
}

impl fmt::Display for ForcedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown forced transport string.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport {0:?}")]
pub struct UnknownTransport(pub String);

impl FromStr for ForcedTransport {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WS" => Ok(ForcedTransport::Ws),
            "HTTP" => Ok(ForcedTransport::Http),
            "WS-STREAMING" => Ok(ForcedTransport::WsStreaming),
            "HTTP-STREAMING" => Ok(ForcedTransport::HttpStreaming),
            "WS-POLLING" => Ok(ForcedTransport::WsPolling),
            "HTTP-POLLING" => Ok(ForcedTransport::HttpPolling),
            _ => Err(UnknownTransport(s.to_string())),
        }
    }
}
