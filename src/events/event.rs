//! # Lifecycle events emitted by the client runtime.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Status events**: the user-visible connection status changed
//! - **Session events**: a session or stream was created, bound, recovered or closed
//! - **Recovery events**: retries, recoveries and transport switches being scheduled
//! - **Request events**: control requests sent, retransmitted or given up on
//!
//! The [`Event`] struct carries metadata such as the session id, the stream,
//! the transport mode, reasons and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use pushvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_reason("socket.error")
//!     .with_delay(Duration::from_millis(80));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.reason.as_deref(), Some("socket.error"));
//! assert_eq!(ev.delay_ms, Some(80));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::orchestrator::TransportMode;
use crate::protocol::{ConnectionId, RequestId, SessionId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: `"full"` or `"closed"`
    SubscriberOverflow,

    // === Status ===
    /// The derived connection status changed.
    ///
    /// Sets:
    /// - `reason`: the new status string, e.g. `"CONNECTED:WS-STREAMING"`
    StatusChanged,

    // === Session lifecycle ===
    /// The server acknowledged a new session.
    ///
    /// Sets:
    /// - `session`: server-assigned id
    /// - `connection`: stream that carried the acknowledgment
    SessionCreated,

    /// A bound stream started delivering.
    ///
    /// Sets:
    /// - `session`, `connection`, `mode`
    SessionBound,

    /// A broken stream was recovered without losing data.
    ///
    /// Sets:
    /// - `session`, `connection`
    SessionRecovered,

    /// A session was closed.
    ///
    /// Sets:
    /// - `session`: id if one was assigned
    /// - `reason`: close cause
    SessionClosed,

    /// The session moved to a different transport mode.
    ///
    /// Sets:
    /// - `mode`: new mode
    /// - `reason`: switch cause
    TransportSwitched,

    // === Recovery ===
    /// A fresh session attempt was scheduled.
    ///
    /// Sets:
    /// - `reason`: failure cause
    /// - `delay_ms`: wait before the attempt
    RetryScheduled,

    /// A recovery attempt was scheduled.
    ///
    /// Sets:
    /// - `reason`: failure cause
    /// - `delay_ms`: wait before the attempt
    RecoveryScheduled,

    /// The stream lags behind the server clock.
    ///
    /// Sets:
    /// - `delay_ms`: estimated lag
    SlowDetected,

    // === Requests ===
    /// A control request was handed to the transport.
    ///
    /// Sets:
    /// - `request`, `connection`, `reason` (request kind)
    RequestSent,

    /// A request was not confirmed in time and was sent again.
    ///
    /// Sets:
    /// - `request`: id of the new request
    /// - `attempt`: retransmission number
    /// - `reason`: request kind
    RequestRetransmitted,

    /// A request became moot and will not be retried.
    ///
    /// Sets:
    /// - `request`, `reason` (request kind)
    RequestAborted,

    // === Terminal ===
    /// The server refused the session for good.
    ///
    /// Sets:
    /// - `reason`: server message with code
    ServerRejected,

    /// An event arrived that the session state does not allow.
    ///
    /// Sets:
    /// - `reason`: `"<state>:<event>"`
    /// - `connection`
    ProtocolViolation,
}

/// Runtime event with optional metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique sequence number (monotonic).
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    pub kind: EventKind,
    pub session: Option<Arc<str>>,
    pub connection: Option<u64>,
    pub request: Option<u64>,
    pub mode: Option<TransportMode>,
    pub reason: Option<Arc<str>>,
    pub delay_ms: Option<u32>,
    pub attempt: Option<u32>,
    /// Subscriber name (subscriber events only).
    pub subscriber: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            session: None,
            connection: None,
            request: None,
            mode: None,
            reason: None,
            delay_ms: None,
            attempt: None,
            subscriber: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_session(mut self, id: &SessionId) -> Self {
        self.session = Some(Arc::from(id.as_str()));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_connection(mut self, conn: ConnectionId) -> Self {
        self.connection = Some(conn.get());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_request(mut self, id: RequestId) -> Self {
        self.request = Some(id.get());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = Some(mode);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a delay (saturates at `u32::MAX` ms).
    #[inline]
    #[must_use]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u32::MAX as u128) as u32);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_subscriber(mut self, name: impl Into<Arc<str>>) -> Self {
        self.subscriber = Some(name.into());
        self
    }

    /// Whether this is a subscriber-infrastructure event.
    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
