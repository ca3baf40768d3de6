//! # Execution context of the synchronous core.
//!
//! The session machine and the orchestrator never perform I/O. They record
//! what should happen as [`Effect`]s and hand requests to each other as
//! notices; the runtime actor executes the effects after each step.
//!
//! ```text
//!  Session ──notice──► Orchestrator
//!     │                    │
//!     └───── Effect ───────┴──► Context::take_effects() ──► actor
//!                                  Send(request)     → Transport::send
//!                                  Close(conn)       → Transport::close
//!                                  Schedule{delay,timer} → sleep, then Command::Timer
//! ```
//!
//! ## Rules
//! - Timers are never cancelled. Each carries the token it was armed
//!   with and is ignored when that token is no longer current.
//! - Notices are processed in emission order, after the call that produced them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::state::Phase;
use crate::core::Config;
use crate::error::ServerRejection;
use crate::events::{Bus, Event, EventKind};
use crate::policies::{GateToken, OfflineGate, RetryBackoff};
use crate::protocol::{Bandwidth, ConnectionId, ControlRequest, IdSource, Notification, SessionId};
use crate::tutor::{RequestLedger, Tutor, TutorId, TutorTable};

/// Which session timeout fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// Create or recover request unanswered.
    Connect,
    /// Bind request unanswered (or created session never looped).
    Bind,
    /// Pause between a loop and the next bind.
    Pause,
    /// Nothing received for a keepalive period.
    Keepalive,
    /// Nothing received while stalling.
    Stalled,
    /// Nothing received while stalled.
    Reconnect,
    /// Wait before a new attempt after a failure.
    Retry,
    /// Jittered wait before the first attempt after a broken stream.
    FirstRetry,
    /// Create deferred while offline.
    Offline,
    /// Retry right away.
    Immediate,
}

impl TimeoutKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeoutKind::Connect => "connect",
            TimeoutKind::Bind => "bind",
            TimeoutKind::Pause => "pause",
            TimeoutKind::Keepalive => "keepalive",
            TimeoutKind::Stalled => "stalled",
            TimeoutKind::Reconnect => "reconnect",
            TimeoutKind::Retry => "retry",
            TimeoutKind::FirstRetry => "first_retry",
            TimeoutKind::Offline => "offline",
            TimeoutKind::Immediate => "immediate",
        }
    }
}

/// Payload of a session timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTimeout {
    pub kind: TimeoutKind,
    pub cause: Arc<str>,
    /// Whether the attempt that follows should try a recovery.
    pub start_recovery: bool,
}

/// Every kind of timer the core arms, with its staleness token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Timer {
    Session {
        conn: ConnectionId,
        phase: Phase,
        timeout: SessionTimeout,
    },
    /// In-place switch guard; `phase` is the orchestrator phase.
    Switch { phase: Phase },
    Tutor { id: TutorId },
    OfflineReset { token: GateToken },
    Heartbeat { token: u64 },
}

/// Side effect requested by the core.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Send(ControlRequest),
    Close(ConnectionId),
    Schedule { delay: Duration, timer: Timer },
}

/// Session-to-orchestrator messages.
///
/// Requests (`Retry`, `Recover`, `StreamSense`, `SwitchReady`,
/// `SlowRequired`) carry the orchestrator phase they were issued under;
/// the rest report facts and are always processed.
#[derive(Debug)]
pub(crate) enum Notice {
    SessionStarted {
        conn: ConnectionId,
        session_id: SessionId,
    },
    SessionRecovered {
        conn: ConnectionId,
        session_id: SessionId,
    },
    StreamBound {
        conn: ConnectionId,
    },
    SessionClosed {
        session_id: Option<SessionId>,
        reason: Arc<str>,
        recovery_scheduled: bool,
    },
    Retry {
        phase: Phase,
        cause: Arc<str>,
    },
    Recover {
        phase: Phase,
        cause: Arc<str>,
    },
    StreamSense {
        phase: Phase,
        cause: Arc<str>,
    },
    SwitchReady {
        phase: Phase,
        cause: Arc<str>,
        start_recovery: bool,
    },
    SlowRequired {
        phase: Phase,
    },
    Deliver(Notification),
    Rejected(ServerRejection),
    Violation,
    ClientIp(Arc<str>),
    BandwidthApplied(Bandwidth),
}

/// WebSocket availability, shared by every session of one client.
#[derive(Debug, Default)]
pub struct TransportAvailability {
    ws_disabled: bool,
    client_ip: Option<Arc<str>>,
}

impl TransportAvailability {
    pub fn ws_available(&self) -> bool {
        !self.ws_disabled
    }

    /// Returns `true` if WebSocket was available until now.
    pub fn disable_ws(&mut self) -> bool {
        !std::mem::replace(&mut self.ws_disabled, true)
    }

    /// Records the address the server sees. Returns `true` when a change of
    /// address re-enabled WebSocket.
    pub fn observe_client_ip(&mut self, ip: &str) -> bool {
        let changed = self.client_ip.as_deref().is_some_and(|prev| prev != ip);
        self.client_ip = Some(Arc::from(ip));
        if changed && self.ws_disabled {
            self.ws_disabled = false;
            return true;
        }
        false
    }
}

/// Shared mutable state of one client core.
pub(crate) struct Context {
    pub config: Arc<Config>,
    pub bus: Bus,
    pub retry: RetryBackoff,
    pub offline: OfflineGate,
    pub availability: TransportAvailability,
    pub tutors: TutorTable,
    pub ledger: RequestLedger,
    pub ids: IdSource,
    effects: Vec<Effect>,
    notices: VecDeque<Notice>,
}

impl Context {
    pub fn new(config: Arc<Config>, bus: Bus) -> Self {
        Self {
            retry: RetryBackoff::new(config.retry_delay),
            config,
            bus,
            offline: OfflineGate::new(),
            availability: TransportAvailability::default(),
            tutors: TutorTable::default(),
            ledger: RequestLedger::default(),
            ids: IdSource::default(),
            effects: Vec::new(),
            notices: VecDeque::new(),
        }
    }

    #[inline]
    pub fn now(&self) -> Instant {
        Instant::now()
    }

    pub fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    /// Hands a request to the transport.
    pub fn send(&mut self, request: ControlRequest) {
        trace!(request = %request.id, conn = %request.conn, kind = request.kind.label(), "send");
        self.publish(
            Event::new(EventKind::RequestSent)
                .with_request(request.id)
                .with_connection(request.conn)
                .with_reason(request.kind.label()),
        );
        self.effects.push(Effect::Send(request));
    }

    /// Sends a request under tutor supervision.
    pub fn send_tutored(&mut self, request: ControlRequest, tutor: Box<dyn Tutor>, attempt: u32) {
        self.ledger.register(request.id, tutor.resolution());
        let (id, timeout) = self
            .tutors
            .arm(request.id, tutor, attempt, self.config.tutor_timeout);
        if attempt > 0 {
            self.publish(
                Event::new(EventKind::RequestRetransmitted)
                    .with_request(request.id)
                    .with_attempt(attempt)
                    .with_reason(request.kind.label()),
            );
        }
        self.send(request);
        self.schedule(timeout, Timer::Tutor { id });
    }

    pub fn close(&mut self, conn: ConnectionId) {
        self.effects.push(Effect::Close(conn));
    }

    pub fn schedule(&mut self, delay: Duration, timer: Timer) {
        self.effects.push(Effect::Schedule { delay, timer });
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push_back(notice);
    }

    pub fn next_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_disabled_until_address_changes() {
        let mut a = TransportAvailability::default();
        assert!(a.ws_available());
        assert!(!a.observe_client_ip("10.0.0.1"));
        assert!(a.disable_ws());
        assert!(!a.disable_ws());
        assert!(!a.observe_client_ip("10.0.0.1"));
        assert!(!a.ws_available());
        assert!(a.observe_client_ip("10.0.0.2"));
        assert!(a.ws_available());
    }

    #[test]
    fn test_effects_are_drained() {
        let mut ctx = Context::new(Arc::new(Config::default()), Bus::new(4));
        let conn = ctx.ids.connection();
        ctx.close(conn);
        ctx.schedule(Duration::ZERO, Timer::Heartbeat { token: 1 });
        assert_eq!(ctx.take_effects().len(), 2);
        assert!(ctx.take_effects().is_empty());
    }
}
