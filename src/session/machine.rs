//! # Session state machine.
//!
//! One [`Session`] instance drives one logical server session over one
//! transport mode. A transport switch or a recovery replaces the instance;
//! the successor inherits the server session id, counters and queued
//! requests from its predecessor.
//!
//! The machine is synchronous: server events, transport failures and
//! timeouts come in through `on_*` methods; outgoing work leaves through
//! the [`Context`] as effects and notices.
//!
//! ## Rules
//! - Every state change bumps the session phase. Timers armed under an older
//!   phase (or for another connection) are ignored.
//! - Events in `Off`/`Sleep` are logged and dropped. An event that is not
//!   legal in an active state is a protocol violation: the session is
//!   closed without recovery.
//! - While `Receiving`, data only refreshes the activity time; the one armed
//!   keepalive timer re-arms itself for the rest of the interval.
//! - A slow-down is requested after two slow verdicts in a row.
//! - Control requests go out only once the server session exists and the
//!   session is not being created; until then they queue in order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::context::{Context, Notice, SessionTimeout, TimeoutKind, Timer};
use super::state::{Phase, SessionState};
use super::status::ConnectionStatus;
use crate::error::{ServerRejection, TransportError};
use crate::events::{Event, EventKind};
use crate::orchestrator::TransportMode;
use crate::policies::{AdaptiveDelayEstimator, GateDecision, RecoveryBudget, Verdict, RESET_AFTER};
use crate::protocol::{
    Bandwidth, ConnectionId, ConnectionOk, ControlRequest, EndCause, Notification, RequestFlags,
    RequestKind, ServerEvent, SessionId,
};
use crate::tutor::{ForceRebindTutor, PendingRequest, SessionView};

/// Consecutive slow verdicts before a slow-down is requested.
const SLOW_FLAGS_TO_SWITCH: u8 = 2;

/// Construction parameters handed down by the orchestrator.
#[derive(Clone, Debug)]
pub(crate) struct SessionParams {
    pub mode: TransportMode,
    pub forced: bool,
    pub orchestrator_phase: Phase,
    pub recovery: RecoveryBudget,
    pub bandwidth: Bandwidth,
    pub heartbeat: Option<Duration>,
}

#[derive(Clone, Debug)]
struct SwitchRequest {
    cause: Arc<str>,
    start_recovery: bool,
}

pub(crate) struct Session {
    mode: TransportMode,
    forced: bool,
    orchestrator_phase: Phase,

    conn: ConnectionId,
    stream_open: bool,
    state: SessionState,
    phase: Phase,

    session_id: Option<SessionId>,
    address: Arc<str>,
    request_limit: Option<u64>,
    keepalive: Option<Duration>,

    bind_count: u64,
    data_count: u64,
    skip: u64,
    worked_before: u32,

    switch: Option<SwitchRequest>,
    slow_required: bool,
    slow_flags: u8,
    last_activity: Option<Instant>,
    closed: bool,
    recovery_pending: bool,
    recovery: RecoveryBudget,
    delay: AdaptiveDelayEstimator,

    pending: VecDeque<PendingRequest>,
    bandwidth: Bandwidth,
    heartbeat: Option<Duration>,
}

impl Session {
    pub fn new(params: SessionParams, ctx: &mut Context) -> Self {
        Self {
            mode: params.mode,
            forced: params.forced,
            orchestrator_phase: params.orchestrator_phase,
            conn: ctx.ids.connection(),
            stream_open: false,
            state: SessionState::Off,
            phase: Phase::default(),
            session_id: None,
            address: Arc::from(ctx.config.server_address.as_str()),
            request_limit: None,
            keepalive: None,
            bind_count: 0,
            data_count: 0,
            skip: 0,
            worked_before: 0,
            switch: None,
            slow_required: false,
            slow_flags: 0,
            last_activity: None,
            closed: false,
            recovery_pending: false,
            recovery: params.recovery,
            delay: AdaptiveDelayEstimator::default(),
            pending: VecDeque::new(),
            bandwidth: params.bandwidth,
            heartbeat: params.heartbeat,
        }
    }

    // ---- accessors ----

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conn(&self) -> ConnectionId {
        self.conn
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[cfg(test)]
    pub fn bind_count(&self) -> u64 {
        self.bind_count
    }

    pub fn data_count(&self) -> u64 {
        self.data_count
    }

    pub fn request_limit(&self) -> Option<u64> {
        self.request_limit
    }

    pub fn recovery(&self) -> RecoveryBudget {
        self.recovery
    }

    pub fn is_recovering(&self) -> bool {
        self.recovery_pending || self.recovery.is_recovering()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn status(&self, orchestrator_status: TransportMode) -> ConnectionStatus {
        if !orchestrator_status.is_connected() {
            return ConnectionStatus::Disconnected;
        }
        ConnectionStatus::derive(self.mode, self.state, self.is_recovering())
    }

    /// Whether the server session is alive and reachable by a bind.
    pub fn is_alive(&self) -> bool {
        self.session_id.is_some() && !self.closed && self.state != SessionState::Off
    }

    /// Whether new requests may still join this instance.
    pub fn accepts_requests(&self) -> bool {
        !self.closed && self.state != SessionState::Off
    }

    pub fn set_forced(&mut self, forced: bool) {
        self.forced = forced;
    }

    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.bandwidth = bandwidth;
    }

    pub fn set_heartbeat(&mut self, heartbeat: Option<Duration>) {
        self.heartbeat = heartbeat;
    }

    // ---- session establishment ----

    /// Starts a fresh server session.
    pub fn create_session(&mut self, old_session: Option<SessionId>, cause: &str, ctx: &mut Context) {
        if self.state.is_active() {
            warn!(state = %self.state, cause, "create on a live session; closing it first");
            self.close_session("new.session", false, true, ctx);
        }
        self.reset_identity(ctx);

        match ctx.offline.check() {
            GateDecision::Defer => {
                let delay = ctx.retry.current_delay();
                info!(cause, ?delay, "offline; create deferred");
                self.enter(SessionState::Sleep, ctx);
                self.arm(TimeoutKind::Offline, delay, "offline", false, ctx);
                ctx.publish(
                    Event::new(EventKind::RetryScheduled)
                        .with_mode(self.mode)
                        .with_reason("offline")
                        .with_delay(delay),
                );
                return;
            }
            GateDecision::ProceedAndArm(token) => {
                ctx.schedule(RESET_AFTER, Timer::OfflineReset { token });
            }
            GateDecision::Proceed => {}
        }

        self.open_stream(ctx);
        self.enter(SessionState::Creating, ctx);
        let request = self.stamp(
            RequestKind::Create {
                old_session,
                bandwidth: self.bandwidth,
            },
            cause,
            ctx,
        );
        ctx.send(request);
        let timeout = ctx.retry.current_delay();
        self.arm(TimeoutKind::Connect, timeout, cause, false, ctx);
    }

    /// Opens a new stream on the existing server session.
    pub fn bind_session(&mut self, cause: &str, ctx: &mut Context) {
        let next = match self.state {
            SessionState::Pause => SessionState::Binding,
            SessionState::FirstPause | SessionState::Off => SessionState::FirstBinding,
            other => {
                warn!(state = %other, cause, "bind ignored");
                return;
            }
        };
        self.bind_count += 1;
        self.open_stream(ctx);
        self.enter(next, ctx);
        self.delay.start_cycle(ctx.now());

        let request = self.stamp(RequestKind::Bind, cause, ctx);
        ctx.send(request);
        let timeout = self.bind_timeout(ctx);
        self.arm(TimeoutKind::Bind, timeout, cause, false, ctx);
    }

    /// Asks the server to resume the session from the notifications already received.
    pub fn recover_session(&mut self, cause: &str, ctx: &mut Context) {
        if !matches!(
            self.state,
            SessionState::Off | SessionState::Sleep | SessionState::Creating
        ) {
            warn!(state = %self.state, cause, "recovery ignored");
            return;
        }
        self.recovery_pending = false;
        self.open_stream(ctx);
        self.enter(SessionState::Creating, ctx);

        let request = self.stamp(
            RequestKind::Recover {
                progress: self.data_count,
            },
            cause,
            ctx,
        );
        ctx.send(request);
        let timeout = ctx.retry.current_delay();
        self.arm(TimeoutKind::Connect, timeout, cause, false, ctx);
    }

    /// Takes over identity and queued requests of the instance being replaced.
    pub fn inherit_from(&mut self, old: &mut Session) {
        self.session_id = old.session_id.clone();
        self.address = Arc::clone(&old.address);
        self.request_limit = old.request_limit;
        self.keepalive = old.keepalive;
        self.bind_count = old.bind_count;
        self.data_count = old.data_count;
        if old.mode == self.mode {
            self.worked_before = old.worked_before;
        }
        self.pending = std::mem::take(&mut old.pending);
    }

    /// Queues requests created while no instance could take them.
    pub fn enqueue(&mut self, requests: impl IntoIterator<Item = PendingRequest>) {
        self.pending.extend(requests);
    }

    /// Shuts the instance down without touching the server session.
    pub fn retire(&mut self, ctx: &mut Context) {
        if self.stream_open {
            ctx.close(self.conn);
            self.stream_open = false;
        }
        self.state = SessionState::Off;
        self.phase = self.phase.next();
        trace!(conn = %self.conn, "session instance retired");
    }

    // ---- inbound ----

    pub fn on_event(&mut self, event: ServerEvent, ctx: &mut Context) {
        if !self.state.is_active() {
            debug!(state = %self.state, event = event.label(), "event on inactive session ignored");
            return;
        }
        match event {
            ServerEvent::ConnectionOk(ok) => self.on_connection_ok(ok, ctx),
            ServerEvent::Notification(n) => self.on_notification(n, ctx),
            ServerEvent::Keepalive => {
                if self.expect_data("probe", ctx) {
                    self.on_activity(ctx);
                }
            }
            ServerEvent::Loop { pause } => self.on_loop(pause, ctx),
            ServerEvent::Sync { elapsed } => self.on_sync(elapsed, ctx),
            ServerEvent::Progress { count } => self.on_progress(count, ctx),
            ServerEvent::Constrain { bandwidth } => {
                debug!(?bandwidth, "bandwidth applied by server");
                ctx.notify(Notice::BandwidthApplied(bandwidth));
            }
            ServerEvent::ClientIp(ip) => ctx.notify(Notice::ClientIp(ip)),
            ServerEvent::SyncError => self.on_error("sync.error", true, false, false, ctx),
            ServerEvent::End(EndCause::Expired) => {
                self.on_error("end.expired", true, false, false, ctx)
            }
            ServerEvent::End(EndCause::Closed) => {
                self.on_error("end.closed", true, false, false, ctx)
            }
            ServerEvent::End(EndCause::TakenOver { code, message })
            | ServerEvent::Error { code, message } => {
                self.on_rejected(ServerRejection::new(code, message), ctx)
            }
            ServerEvent::Interrupted => self.on_error("stream.interrupted", false, false, true, ctx),
            ServerEvent::RequestOk { .. } | ServerEvent::RequestError { .. } => {
                trace!("control response reached the session; ignored");
            }
        }
    }

    pub fn on_transport_error(&mut self, error: &TransportError, ctx: &mut Context) {
        warn!(conn = %self.conn, state = %self.state, error = %error, "stream failed");
        self.on_error(error.as_label(), false, error.unable_to_open(), true, ctx);
    }

    pub fn on_stream_closed(&mut self, ctx: &mut Context) {
        if !self.stream_open
            || matches!(self.state, SessionState::Pause | SessionState::FirstPause)
        {
            trace!(conn = %self.conn, "stream closed after loop");
            return;
        }
        self.on_error("stream.closed", false, false, true, ctx);
    }

    fn on_connection_ok(&mut self, ok: ConnectionOk, ctx: &mut Context) {
        match self.state {
            SessionState::Creating if self.recovery.is_recovering() => {
                if self.session_id.as_ref() != Some(&ok.session_id) {
                    warn!(session = %ok.session_id, "recovery answered for another session");
                    self.on_error("recovery.mismatch", true, false, false, ctx);
                    return;
                }
                self.apply_connection_ok(&ok);
                self.recovery.restore_time_left();
                self.bind_count += 1;
                info!(session = %ok.session_id, progress = self.data_count, "session recovered");
                self.enter_receiving(ctx);
                ctx.notify(Notice::SessionRecovered {
                    conn: self.conn,
                    session_id: ok.session_id,
                });
            }
            SessionState::Creating => {
                self.session_id = Some(ok.session_id.clone());
                self.apply_connection_ok(&ok);
                self.enter(SessionState::Created, ctx);
                info!(session = %ok.session_id, mode = %self.mode, "session created");
                ctx.notify(Notice::SessionStarted {
                    conn: self.conn,
                    session_id: ok.session_id,
                });
                self.flush_pending(ctx);
                let timeout = self.bind_timeout(ctx);
                self.arm(TimeoutKind::Bind, timeout, "created", false, ctx);
            }
            SessionState::FirstBinding | SessionState::Binding => {
                let first = self.state == SessionState::FirstBinding;
                if ok.keepalive.is_some() {
                    self.keepalive = ok.keepalive;
                }
                self.enter_receiving(ctx);
                if first {
                    ctx.notify(Notice::StreamBound { conn: self.conn });
                }
            }
            _ => self.violation("conok", ctx),
        }
    }

    fn on_notification(&mut self, n: Notification, ctx: &mut Context) {
        if !self.expect_data("notification", ctx) {
            return;
        }
        self.on_activity(ctx);
        if self.skip > 0 {
            self.skip -= 1;
            trace!(left = self.skip, "replayed notification skipped");
            return;
        }
        self.data_count += 1;
        ctx.notify(Notice::Deliver(n));
    }

    fn on_loop(&mut self, pause: Duration, ctx: &mut Context) {
        if !self.expect_data("loop", ctx) {
            return;
        }
        self.stream_open = false;
        if self.switch.is_some() || self.slow_required {
            debug!(conn = %self.conn, "loop reached; handing off switch");
            self.hand_off(false, ctx);
            return;
        }
        let (next, cause) = match self.state {
            SessionState::Created | SessionState::FirstBinding => (SessionState::FirstPause, "loop1"),
            _ => (SessionState::Pause, "loop"),
        };
        self.enter(next, ctx);
        let delay = self.pause_after_loop(pause, ctx);
        self.arm(TimeoutKind::Pause, delay, cause, false, ctx);
    }

    fn on_sync(&mut self, elapsed: Duration, ctx: &mut Context) {
        if !self.expect_data("sync", ctx) {
            return;
        }
        self.on_activity(ctx);
        match self.delay.observe(elapsed, ctx.now()) {
            Verdict::Slow => {
                self.slow_flags = self.slow_flags.saturating_add(1);
                if self.slow_flags < SLOW_FLAGS_TO_SWITCH {
                    debug!(lag = ?self.delay.mean(), "stream flagged slow");
                    return;
                }
                if self.mode.is_polling()
                    || self.forced
                    || !ctx.config.slowing_enabled
                    || self.slow_required
                {
                    return;
                }
                warn!(lag = ?self.delay.mean(), mode = %self.mode, "stream cannot keep up");
                ctx.publish(
                    Event::new(EventKind::SlowDetected)
                        .with_mode(self.mode)
                        .with_delay(self.delay.mean()),
                );
                ctx.notify(Notice::SlowRequired {
                    phase: self.orchestrator_phase,
                });
            }
            Verdict::Suspended => debug!("clock gap in sync; sample withheld"),
            Verdict::Normal => self.slow_flags = 0,
        }
    }

    fn on_progress(&mut self, count: u64, ctx: &mut Context) {
        if count > self.data_count {
            error!(
                server = count,
                local = self.data_count,
                "server counts more notifications than received"
            );
            self.on_error("prog.mismatch", false, false, false, ctx);
            return;
        }
        self.skip = self.data_count - count;
        if self.skip > 0 {
            debug!(skip = self.skip, "server replays already received notifications");
        }
    }

    fn on_rejected(&mut self, rejection: ServerRejection, ctx: &mut Context) {
        error!(code = rejection.code, message = %rejection.message, "session rejected by server");
        self.close_session("server.rejected", true, true, ctx);
        ctx.notify(Notice::Rejected(rejection));
    }

    /// Data-carrying events are legal only while a stream is up.
    fn expect_data(&mut self, label: &str, ctx: &mut Context) -> bool {
        if matches!(
            self.state,
            SessionState::Created
                | SessionState::FirstBinding
                | SessionState::Binding
                | SessionState::Receiving
                | SessionState::Stalling
                | SessionState::Stalled
        ) {
            return true;
        }
        self.violation(label, ctx);
        false
    }

    fn on_activity(&mut self, ctx: &mut Context) {
        match self.state {
            SessionState::FirstBinding | SessionState::Binding => self.enter_receiving(ctx),
            SessionState::Stalling | SessionState::Stalled => {
                info!(conn = %self.conn, "stream resumed");
                self.enter(SessionState::Receiving, ctx);
                self.arm_receiving_timeout(ctx);
            }
            SessionState::Receiving => self.last_activity = Some(ctx.now()),
            _ => {}
        }
    }

    fn enter_receiving(&mut self, ctx: &mut Context) {
        self.enter(SessionState::Receiving, ctx);
        self.worked_before += 1;
        let floor = ctx.config.retry_delay;
        ctx.retry.reset(floor);
        self.arm_receiving_timeout(ctx);
        self.flush_pending(ctx);
    }

    fn violation(&mut self, label: &str, ctx: &mut Context) {
        error!(conn = %self.conn, state = %self.state, event = label, "event not allowed in this state");
        ctx.publish(
            Event::new(EventKind::ProtocolViolation)
                .with_connection(self.conn)
                .with_reason(format!("{}:{label}", self.state)),
        );
        self.close_session("protocol.violation", false, true, ctx);
        ctx.notify(Notice::Violation);
    }

    // ---- timeouts ----

    pub fn on_timeout(
        &mut self,
        conn: ConnectionId,
        phase: Phase,
        timeout: SessionTimeout,
        ctx: &mut Context,
    ) {
        if conn != self.conn || phase != self.phase {
            trace!(kind = timeout.kind.as_str(), "stale session timer");
            return;
        }
        trace!(state = %self.state, kind = timeout.kind.as_str(), cause = %timeout.cause, "session timeout");
        let now = ctx.now();
        match self.state {
            SessionState::Off => debug!(kind = timeout.kind.as_str(), "timeout while off"),
            SessionState::Creating => self.on_create_timeout(now, ctx),
            SessionState::Created
            | SessionState::Binding
            | SessionState::Stalled
            | SessionState::Sleep => self.on_silence(timeout, now, ctx),
            SessionState::FirstBinding => self.on_first_bind_timeout(now, ctx),
            SessionState::Pause => self.bind_session("loop", ctx),
            SessionState::FirstPause => self.bind_session("loop1", ctx),
            SessionState::Receiving => {
                if let Some(at) = self.last_activity.take() {
                    let limit = self.receiving_timeout(ctx);
                    let idle = now.saturating_duration_since(at);
                    if idle < limit {
                        self.arm(TimeoutKind::Keepalive, limit - idle, "keepalive", false, ctx);
                        return;
                    }
                }
                debug!(conn = %self.conn, "no data within keepalive; stalling");
                self.enter(SessionState::Stalling, ctx);
                let delay = ctx.config.stalled_timeout;
                self.arm(TimeoutKind::Stalled, delay, "stalling", false, ctx);
            }
            SessionState::Stalling => {
                warn!(conn = %self.conn, "stream stalled");
                self.enter(SessionState::Stalled, ctx);
                let delay = ctx.config.reconnect_timeout;
                self.arm(TimeoutKind::Reconnect, delay, "stalled", true, ctx);
            }
        }
    }

    fn on_create_timeout(&mut self, now: Instant, ctx: &mut Context) {
        let left = self
            .recovery
            .time_left(ctx.config.session_recovery_timeout, now);
        if self.recovery.is_recovering() && !left.is_zero() {
            info!(?left, "recovery unanswered; trying again");
            self.recover_session("recovery.timeout", ctx);
            return;
        }
        ctx.retry.increase();
        warn!(next_timeout = ?ctx.retry.current_delay(), "create unanswered");
        self.close_session("create.timeout", false, false, ctx);
        self.arm(TimeoutKind::Immediate, Duration::ZERO, "create.timeout", false, ctx);
        ctx.publish(
            Event::new(EventKind::RetryScheduled)
                .with_mode(self.mode)
                .with_reason("create.timeout")
                .with_delay(Duration::ZERO),
        );
    }

    fn on_silence(&mut self, timeout: SessionTimeout, now: Instant, ctx: &mut Context) {
        if self.switch.is_some() || self.slow_required {
            let recover = timeout.start_recovery && self.recovery_possible(now, ctx);
            self.hand_off(recover, ctx);
            return;
        }
        if timeout.kind == TimeoutKind::Offline {
            ctx.notify(Notice::Retry {
                phase: self.orchestrator_phase,
                cause: timeout.cause,
            });
            return;
        }
        if !self.mode.is_polling() || self.forced {
            if timeout.start_recovery && self.recovery_possible(now, ctx) {
                self.recovery_pending = true;
                ctx.notify(Notice::Recover {
                    phase: self.orchestrator_phase,
                    cause: timeout.cause,
                });
            } else {
                ctx.notify(Notice::Retry {
                    phase: self.orchestrator_phase,
                    cause: timeout.cause,
                });
            }
        } else {
            ctx.notify(Notice::StreamSense {
                phase: self.orchestrator_phase,
                cause: timeout.cause,
            });
        }
    }

    fn on_first_bind_timeout(&mut self, now: Instant, ctx: &mut Context) {
        if self.switch.is_some() || self.slow_required {
            self.hand_off(false, ctx);
        } else if self.worked_before > 0 || self.forced {
            if self.recovery_possible(now, ctx) {
                self.recovery_pending = true;
                ctx.notify(Notice::Recover {
                    phase: self.orchestrator_phase,
                    cause: "bind.timeout".into(),
                });
            } else {
                ctx.notify(Notice::Retry {
                    phase: self.orchestrator_phase,
                    cause: "bind.timeout".into(),
                });
            }
        } else if self.mode.is_polling() {
            ctx.notify(Notice::Retry {
                phase: self.orchestrator_phase,
                cause: "bind.timeout".into(),
            });
        } else {
            info!(mode = %self.mode, "stream never delivered; sensing another transport");
            ctx.notify(Notice::StreamSense {
                phase: self.orchestrator_phase,
                cause: "bind.timeout".into(),
            });
        }
    }

    fn recovery_possible(&self, now: Instant, ctx: &Context) -> bool {
        ctx.config.recovery_enabled()
            && !self.closed
            && self.session_id.is_some()
            && !self
                .recovery
                .time_left(ctx.config.session_recovery_timeout, now)
                .is_zero()
    }

    // ---- errors ----

    /// Common failure path.
    ///
    /// Established sessions retry after a short jittered pause, recovering
    /// when eligible. Establishing sessions back off with the retry delay or
    /// hand over to transport sensing.
    pub fn on_error(
        &mut self,
        reason: &str,
        closed_on_server: bool,
        unable_to_open: bool,
        start_recovery: bool,
        ctx: &mut Context,
    ) {
        let now = ctx.now();
        if unable_to_open
            && self.mode.is_ws()
            && !self.forced
            && self.worked_before == 0
            && ctx.availability.disable_ws()
        {
            warn!(reason, "websocket cannot be opened; disabled");
        }

        match self.state {
            state if state.is_established() => {
                let pause = ctx
                    .config
                    .first_retry_jitter
                    .apply(ctx.config.first_retry_max_delay);
                if start_recovery && !closed_on_server && self.recovery_possible(now, ctx) {
                    info!(reason, ?pause, "stream broken; recovery scheduled");
                    self.enter(SessionState::Sleep, ctx);
                    self.recovery_pending = true;
                    self.arm(TimeoutKind::FirstRetry, pause, reason, true, ctx);
                    ctx.publish(
                        Event::new(EventKind::RecoveryScheduled)
                            .with_mode(self.mode)
                            .with_reason(reason)
                            .with_delay(pause),
                    );
                } else {
                    info!(reason, ?pause, "stream broken; retry scheduled");
                    self.close_session(reason, closed_on_server, false, ctx);
                    self.arm(TimeoutKind::FirstRetry, pause, reason, false, ctx);
                    ctx.publish(
                        Event::new(EventKind::RetryScheduled)
                            .with_mode(self.mode)
                            .with_reason(reason)
                            .with_delay(pause),
                    );
                }
            }
            state if state.is_establishing() => {
                let left = self
                    .recovery
                    .time_left(ctx.config.session_recovery_timeout, now);
                if self.recovery.is_recovering()
                    && !left.is_zero()
                    && start_recovery
                    && !closed_on_server
                {
                    let pause = ctx.retry.current_delay();
                    ctx.retry.increase();
                    info!(reason, ?pause, ?left, "recovery failed; trying again");
                    self.enter(SessionState::Sleep, ctx);
                    self.recovery_pending = true;
                    self.arm(TimeoutKind::Retry, pause, reason, true, ctx);
                    ctx.publish(
                        Event::new(EventKind::RecoveryScheduled)
                            .with_mode(self.mode)
                            .with_reason(reason)
                            .with_delay(pause),
                    );
                } else if !self.forced
                    && (self.switch.is_some() || (unable_to_open && self.mode.is_ws()))
                {
                    info!(reason, mode = %self.mode, "cannot establish; sensing another transport");
                    ctx.notify(Notice::StreamSense {
                        phase: self.orchestrator_phase,
                        cause: reason.into(),
                    });
                } else {
                    let pause = ctx.retry.current_delay();
                    ctx.retry.increase();
                    info!(reason, ?pause, "cannot establish; retry scheduled");
                    self.close_session(reason, closed_on_server, false, ctx);
                    self.arm(TimeoutKind::Retry, pause, reason, false, ctx);
                    ctx.publish(
                        Event::new(EventKind::RetryScheduled)
                            .with_mode(self.mode)
                            .with_reason(reason)
                            .with_delay(pause),
                    );
                }
            }
            state => debug!(%state, reason, "error ignored"),
        }
    }

    // ---- switching ----

    /// Asks the running session to move to another transport at its next loop.
    pub fn request_switch(
        &mut self,
        orchestrator_phase: Phase,
        cause: &str,
        start_recovery: bool,
        ctx: &mut Context,
    ) {
        self.orchestrator_phase = orchestrator_phase;
        if self.switch.is_none() {
            self.switch = Some(SwitchRequest {
                cause: cause.into(),
                start_recovery,
            });
        }
        self.after_switch_request("switch", ctx);
    }

    /// Like [`request_switch`](Self::request_switch) for a slow-down to polling.
    pub fn request_slow(&mut self, orchestrator_phase: Phase, ctx: &mut Context) {
        self.orchestrator_phase = orchestrator_phase;
        self.slow_required = true;
        self.after_switch_request("slow", ctx);
    }

    fn after_switch_request(&mut self, cause: &str, ctx: &mut Context) {
        match self.state {
            SessionState::Off
            | SessionState::Sleep
            | SessionState::Pause
            | SessionState::FirstPause => {
                let recover = self.recovery_pending
                    || self.switch.as_ref().is_some_and(|s| s.start_recovery);
                self.hand_off(recover, ctx);
            }
            _ => {
                self.sync_view(ctx);
                if self.session_id.is_some() {
                    let tutor = ForceRebindTutor::new(self.session_id.clone(), self.bind_count);
                    self.submit(
                        PendingRequest::new(RequestKind::ForceRebind, cause, Box::new(tutor)),
                        ctx,
                    );
                }
            }
        }
    }

    fn hand_off(&mut self, start_recovery: bool, ctx: &mut Context) {
        let cause = self
            .switch
            .as_ref()
            .map(|s| Arc::clone(&s.cause))
            .unwrap_or_else(|| Arc::from("slow"));
        ctx.notify(Notice::SwitchReady {
            phase: self.orchestrator_phase,
            cause,
            start_recovery,
        });
    }

    // ---- closing ----

    /// Ends the server session.
    ///
    /// Sends a destroy request unless the server already closed it, then
    /// goes to `Sleep` when a retry is scheduled or `Off` otherwise.
    /// Requests still queued are aborted.
    pub fn close_session(
        &mut self,
        reason: &str,
        closed_on_server: bool,
        no_recovery_scheduled: bool,
        ctx: &mut Context,
    ) {
        if self.state == SessionState::Off {
            debug!(reason, "close on an inactive session");
            return;
        }
        if self.closed {
            if no_recovery_scheduled {
                self.shutdown(false, ctx);
            }
            return;
        }
        info!(session = ?self.session_id, reason, closed_on_server, "closing session");
        if !closed_on_server && self.session_id.is_some() {
            let request = self.stamp(RequestKind::Destroy, reason, ctx);
            ctx.send(request);
        }
        self.closed = true;
        self.recovery_pending = false;
        self.recovery.restore_time_left();
        for mut pending in self.pending.drain(..) {
            if let Some(n) = pending.tutor.notify_abort() {
                ctx.notify(Notice::Deliver(n));
            }
        }
        ctx.notify(Notice::SessionClosed {
            session_id: self.session_id.clone(),
            reason: reason.into(),
            recovery_scheduled: !no_recovery_scheduled,
        });
        self.shutdown(!no_recovery_scheduled, ctx);
    }

    fn shutdown(&mut self, sleep: bool, ctx: &mut Context) {
        if self.stream_open {
            ctx.close(self.conn);
            self.stream_open = false;
        }
        let next = if sleep {
            SessionState::Sleep
        } else {
            SessionState::Off
        };
        self.enter(next, ctx);
    }

    // ---- control requests ----

    pub fn can_send_control(&self) -> bool {
        self.session_id.is_some()
            && !self.closed
            && !matches!(
                self.state,
                SessionState::Off | SessionState::Sleep | SessionState::Creating
            )
    }

    /// Sends a control request now, or queues it until the session can take it.
    pub fn submit(&mut self, pending: PendingRequest, ctx: &mut Context) {
        if self.can_send_control() {
            self.transmit(pending, ctx);
        } else {
            trace!(kind = pending.kind.label(), queued = self.pending.len() + 1, "request queued");
            self.pending.push_back(pending);
        }
    }

    pub fn flush_pending(&mut self, ctx: &mut Context) {
        while self.can_send_control() {
            let Some(pending) = self.pending.pop_front() else {
                break;
            };
            self.transmit(pending, ctx);
        }
    }

    /// Drops queued requests matching `pred`; their tutors are told.
    pub fn abort_pending_where(
        &mut self,
        pred: impl Fn(&PendingRequest) -> bool,
    ) -> Vec<Notification> {
        let mut out = Vec::new();
        let mut keep = VecDeque::with_capacity(self.pending.len());
        for mut p in self.pending.drain(..) {
            if pred(&p) {
                out.extend(p.tutor.notify_abort());
            } else {
                keep.push_back(p);
            }
        }
        self.pending = keep;
        out
    }

    /// Sends a reverse heartbeat when a control link is available.
    pub fn send_heartbeat(&mut self, ctx: &mut Context) -> bool {
        if !self.can_send_control() {
            return false;
        }
        let request = self.stamp(RequestKind::Heartbeat, "heartbeat", ctx);
        ctx.send(request);
        true
    }

    fn transmit(&mut self, pending: PendingRequest, ctx: &mut Context) {
        let request = self.stamp(pending.kind, &pending.cause, ctx);
        ctx.send_tutored(request, pending.tutor, pending.attempt);
    }

    // ---- helpers ----

    fn enter(&mut self, next: SessionState, ctx: &mut Context) {
        let prev = std::mem::replace(&mut self.state, next);
        self.phase = self.phase.next();
        if prev != next {
            debug!(conn = %self.conn, from = %prev, to = %next, "session state");
        }
        self.sync_view(ctx);
    }

    fn sync_view(&self, ctx: &mut Context) {
        ctx.ledger.track_session(SessionView {
            session_id: self.session_id.clone(),
            bind_count: self.bind_count,
            rebind_wanted: self.switch.is_some() || self.slow_required,
        });
    }

    fn reset_identity(&mut self, ctx: &mut Context) {
        self.session_id = None;
        self.address = Arc::from(ctx.config.server_address.as_str());
        self.request_limit = None;
        self.keepalive = None;
        self.bind_count = 0;
        self.data_count = 0;
        self.skip = 0;
        self.switch = None;
        self.slow_required = false;
        self.slow_flags = 0;
        self.last_activity = None;
        self.closed = false;
        self.recovery_pending = false;
        self.recovery = RecoveryBudget::default();
    }

    fn apply_connection_ok(&mut self, ok: &ConnectionOk) {
        self.request_limit = ok.request_limit;
        if ok.keepalive.is_some() {
            self.keepalive = ok.keepalive;
        }
        if let Some(link) = &ok.control_link {
            self.address = Arc::clone(link);
        }
    }

    fn open_stream(&mut self, ctx: &mut Context) {
        if self.stream_open {
            ctx.close(self.conn);
        }
        self.conn = ctx.ids.connection();
        self.stream_open = true;
    }

    fn arm(
        &mut self,
        kind: TimeoutKind,
        delay: Duration,
        cause: impl Into<Arc<str>>,
        start_recovery: bool,
        ctx: &mut Context,
    ) {
        ctx.schedule(
            delay,
            Timer::Session {
                conn: self.conn,
                phase: self.phase,
                timeout: SessionTimeout {
                    kind,
                    cause: cause.into(),
                    start_recovery,
                },
            },
        );
    }

    fn arm_receiving_timeout(&mut self, ctx: &mut Context) {
        self.last_activity = None;
        let delay = self.receiving_timeout(ctx);
        self.arm(TimeoutKind::Keepalive, delay, "keepalive", false, ctx);
    }

    /// Silence tolerated while receiving.
    fn receiving_timeout(&self, ctx: &Context) -> Duration {
        if self.mode.is_polling() {
            self.bind_timeout(ctx)
        } else {
            self.keepalive
                .unwrap_or_else(|| ctx.config.keepalive_fallback())
        }
    }

    fn bind_timeout(&self, ctx: &Context) -> Duration {
        let connect = ctx.retry.current_delay();
        if self.mode.is_polling() {
            connect + ctx.config.idle_timeout
        } else if self.worked_before > 0 {
            ctx.config.reconnect_timeout
        } else {
            connect
        }
    }

    fn pause_after_loop(&self, server_pause: Duration, ctx: &Context) -> Duration {
        if !self.mode.is_polling() {
            return Duration::ZERO;
        }
        ctx.config.polling_hint().unwrap_or(server_pause)
    }

    fn flags(&self, ctx: &Context) -> RequestFlags {
        let polling = self.mode.is_polling();
        RequestFlags {
            polling,
            http: self.mode.is_http(),
            keepalive_hint: if polling {
                None
            } else {
                ctx.config.keepalive_hint()
            },
            idle_timeout: polling.then_some(ctx.config.idle_timeout),
            polling_interval: if polling {
                ctx.config.polling_hint()
            } else {
                None
            },
            inactivity: self.heartbeat,
        }
    }

    fn stamp(&self, kind: RequestKind, cause: &str, ctx: &mut Context) -> ControlRequest {
        let flags = self.flags(ctx);
        ControlRequest {
            id: ctx.ids.request(),
            conn: self.conn,
            address: Arc::clone(&self.address),
            session_id: self.session_id.clone(),
            cause: cause.into(),
            kind,
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::events::Bus;
    use crate::policies::JitterPolicy;
    use crate::session::Effect;

    fn context(config: Config) -> Context {
        Context::new(Arc::new(config), Bus::new(64))
    }

    fn session(mode: TransportMode, ctx: &mut Context) -> Session {
        Session::new(
            SessionParams {
                mode,
                forced: false,
                orchestrator_phase: Phase::default(),
                recovery: RecoveryBudget::default(),
                bandwidth: Bandwidth::Unlimited,
                heartbeat: None,
            },
            ctx,
        )
    }

    fn sent(effects: &[Effect]) -> Vec<&RequestKind> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(r) => Some(&r.kind),
                _ => None,
            })
            .collect()
    }

    fn last_timer(effects: &[Effect]) -> Option<(Duration, Timer)> {
        effects.iter().rev().find_map(|e| match e {
            Effect::Schedule { delay, timer } => Some((*delay, timer.clone())),
            _ => None,
        })
    }

    fn notices(ctx: &mut Context) -> Vec<Notice> {
        std::iter::from_fn(|| ctx.next_notice()).collect()
    }

    fn fire_last(s: &mut Session, ctx: &mut Context, effects: &[Effect]) {
        let Some((_, Timer::Session { conn, phase, timeout })) = last_timer(effects) else {
            panic!("no session timer armed");
        };
        s.on_timeout(conn, phase, timeout, ctx);
    }

    fn created(s: &mut Session, ctx: &mut Context) {
        s.create_session(None, "api", ctx);
        s.on_event(ServerEvent::ConnectionOk(ConnectionOk::new("S1")), ctx);
    }

    #[test]
    fn test_create_sends_request_and_arms_connect_timeout() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        s.create_session(None, "api", &mut ctx);
        let effects = ctx.take_effects();
        assert_eq!(s.state(), SessionState::Creating);
        assert!(matches!(sent(&effects)[..], [RequestKind::Create { .. }]));
        let (delay, timer) = last_timer(&effects).unwrap();
        assert_eq!(delay, Duration::from_secs(4));
        assert!(matches!(
            timer,
            Timer::Session { timeout: SessionTimeout { kind: TimeoutKind::Connect, .. }, .. }
        ));
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        s.create_session(None, "api", &mut ctx);
        let effects = ctx.take_effects();
        s.on_event(ServerEvent::ConnectionOk(ConnectionOk::new("S1")), &mut ctx);
        fire_last(&mut s, &mut ctx, &effects);
        assert_eq!(s.state(), SessionState::Created);
    }

    #[test]
    fn test_queued_requests_flush_after_creation() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        s.create_session(None, "api", &mut ctx);
        let sub = crate::protocol::SubscriptionId(1);
        ctx.ledger.add_subscription(sub);
        s.submit(
            PendingRequest::new(
                RequestKind::Subscribe { subscription: sub, params: Default::default() },
                "api",
                Box::new(crate::tutor::SubscribeTutor::new(sub, Default::default())),
            ),
            &mut ctx,
        );
        assert_eq!(s.pending_len(), 1);
        ctx.take_effects();
        s.on_event(ServerEvent::ConnectionOk(ConnectionOk::new("S1")), &mut ctx);
        let effects = ctx.take_effects();
        assert_eq!(s.pending_len(), 0);
        assert!(matches!(sent(&effects)[..], [RequestKind::Subscribe { .. }]));
    }

    #[test]
    fn test_streaming_loop_rebinds_without_pause() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingHttp, &mut ctx);
        created(&mut s, &mut ctx);
        s.on_event(ServerEvent::Loop { pause: Duration::from_secs(3) }, &mut ctx);
        assert_eq!(s.state(), SessionState::FirstPause);
        let effects = ctx.take_effects();
        assert_eq!(last_timer(&effects).unwrap().0, Duration::ZERO);
        fire_last(&mut s, &mut ctx, &effects);
        assert_eq!(s.state(), SessionState::FirstBinding);
        assert_eq!(s.bind_count(), 1);
        s.on_event(ServerEvent::ConnectionOk(ConnectionOk::new("S1")), &mut ctx);
        assert_eq!(s.state(), SessionState::Receiving);
    }

    #[test]
    fn test_polling_loop_waits_for_server_pause() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::PollingHttp, &mut ctx);
        created(&mut s, &mut ctx);
        ctx.take_effects();
        s.on_event(ServerEvent::Loop { pause: Duration::from_secs(3) }, &mut ctx);
        let effects = ctx.take_effects();
        assert_eq!(last_timer(&effects).unwrap().0, Duration::from_secs(3));
    }

    #[test]
    fn test_silence_walks_through_stalling_to_stalled() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        created(&mut s, &mut ctx);
        s.on_event(ServerEvent::Loop { pause: Duration::ZERO }, &mut ctx);
        let effects = ctx.take_effects();
        fire_last(&mut s, &mut ctx, &effects);
        s.on_event(ServerEvent::Keepalive, &mut ctx);
        assert_eq!(s.state(), SessionState::Receiving);

        let effects = ctx.take_effects();
        fire_last(&mut s, &mut ctx, &effects);
        assert_eq!(s.state(), SessionState::Stalling);
        let effects = ctx.take_effects();
        assert_eq!(last_timer(&effects).unwrap().0, Duration::from_secs(2));
        fire_last(&mut s, &mut ctx, &effects);
        assert_eq!(s.state(), SessionState::Stalled);
        let effects = ctx.take_effects();
        assert_eq!(last_timer(&effects).unwrap().0, Duration::from_secs(3));

        s.on_event(ServerEvent::Keepalive, &mut ctx);
        assert_eq!(s.state(), SessionState::Receiving);
    }

    #[test]
    fn test_progress_skips_replayed_notifications() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        created(&mut s, &mut ctx);
        let update = || {
            ServerEvent::Notification(Notification::EndOfSnapshot {
                subscription: crate::protocol::SubscriptionId(1),
                item: 1,
            })
        };
        for _ in 0..3 {
            s.on_event(update(), &mut ctx);
        }
        assert_eq!(s.data_count(), 3);
        s.on_event(ServerEvent::Progress { count: 1 }, &mut ctx);
        notices(&mut ctx);
        s.on_event(update(), &mut ctx);
        s.on_event(update(), &mut ctx);
        assert_eq!(s.data_count(), 3);
        assert!(notices(&mut ctx).is_empty());
        s.on_event(update(), &mut ctx);
        assert_eq!(s.data_count(), 4);
    }

    #[test]
    fn test_progress_ahead_of_local_count_closes_session() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        created(&mut s, &mut ctx);
        s.on_event(ServerEvent::Progress { count: 5 }, &mut ctx);
        assert!(s.is_closed());
        assert_eq!(s.state(), SessionState::Sleep);
    }

    #[test]
    fn test_unexpected_event_is_a_violation() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        s.create_session(None, "api", &mut ctx);
        s.on_event(ServerEvent::Loop { pause: Duration::ZERO }, &mut ctx);
        assert_eq!(s.state(), SessionState::Off);
        let ns = notices(&mut ctx);
        assert!(matches!(ns.last(), Some(Notice::Violation)));
    }

    #[test]
    fn test_events_ignored_when_inactive() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        s.on_event(ServerEvent::Keepalive, &mut ctx);
        assert_eq!(s.state(), SessionState::Off);
        assert!(notices(&mut ctx).is_empty());
    }

    #[test]
    fn test_broken_stream_schedules_recovery_with_jitter_bound() {
        let config = Config {
            first_retry_jitter: JitterPolicy::None,
            ..Config::default()
        };
        let mut ctx = context(config);
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        created(&mut s, &mut ctx);
        s.on_event(ServerEvent::Loop { pause: Duration::ZERO }, &mut ctx);
        let effects = ctx.take_effects();
        fire_last(&mut s, &mut ctx, &effects);
        s.on_event(ServerEvent::Keepalive, &mut ctx);
        ctx.take_effects();

        s.on_event(ServerEvent::Interrupted, &mut ctx);
        assert_eq!(s.state(), SessionState::Sleep);
        assert!(s.is_recovering());
        assert!(!s.is_closed());
        let effects = ctx.take_effects();
        let (delay, timer) = last_timer(&effects).unwrap();
        assert_eq!(delay, Duration::from_millis(100));
        assert!(matches!(
            timer,
            Timer::Session { timeout: SessionTimeout { start_recovery: true, .. }, .. }
        ));
    }

    #[test]
    fn test_server_end_closes_without_destroy() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        created(&mut s, &mut ctx);
        ctx.take_effects();
        s.on_event(ServerEvent::End(EndCause::Expired), &mut ctx);
        let effects = ctx.take_effects();
        assert!(sent(&effects).is_empty());
        assert!(s.is_closed());
        assert_eq!(s.state(), SessionState::Sleep);
    }

    #[test]
    fn test_rejection_is_terminal() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        created(&mut s, &mut ctx);
        s.on_event(
            ServerEvent::End(EndCause::TakenOver {
                code: 31,
                message: "taken".into(),
            }),
            &mut ctx,
        );
        assert_eq!(s.state(), SessionState::Off);
        let ns = notices(&mut ctx);
        assert!(matches!(ns.last(), Some(Notice::Rejected(r)) if r.code == 31));
    }

    #[test]
    fn test_switch_request_while_streaming_sends_force_rebind() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        created(&mut s, &mut ctx);
        s.on_event(ServerEvent::Loop { pause: Duration::ZERO }, &mut ctx);
        let effects = ctx.take_effects();
        fire_last(&mut s, &mut ctx, &effects);
        s.on_event(ServerEvent::Keepalive, &mut ctx);
        notices(&mut ctx);
        ctx.take_effects();

        s.request_switch(Phase::default(), "api.forced", false, &mut ctx);
        let effects = ctx.take_effects();
        assert!(matches!(sent(&effects)[..], [RequestKind::ForceRebind]));
        assert!(ctx.ledger.session().rebind_wanted);

        s.on_event(ServerEvent::Loop { pause: Duration::ZERO }, &mut ctx);
        let ns = notices(&mut ctx);
        assert!(matches!(
            ns.last(),
            Some(Notice::SwitchReady { start_recovery: false, .. })
        ));
    }

    #[test]
    fn test_create_timeout_closes_and_retries_immediately() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        s.create_session(None, "api", &mut ctx);
        let effects = ctx.take_effects();
        fire_last(&mut s, &mut ctx, &effects);
        assert_eq!(s.state(), SessionState::Sleep);
        assert_eq!(ctx.retry.attempts(), 1);
        let effects = ctx.take_effects();
        let (delay, _) = last_timer(&effects).unwrap();
        assert_eq!(delay, Duration::ZERO);
        fire_last(&mut s, &mut ctx, &effects);
        assert!(notices(&mut ctx)
            .iter()
            .any(|n| matches!(n, Notice::Retry { .. })));
    }

    fn receiving(s: &mut Session, ctx: &mut Context) {
        created(s, ctx);
        s.on_event(ServerEvent::Loop { pause: Duration::ZERO }, ctx);
        let effects = ctx.take_effects();
        fire_last(s, ctx, &effects);
        s.on_event(ServerEvent::Keepalive, ctx);
        assert_eq!(s.state(), SessionState::Receiving);
    }

    #[test]
    fn test_data_while_receiving_keeps_one_keepalive_timer() {
        let mut ctx = context(Config::default());
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        receiving(&mut s, &mut ctx);
        let armed = ctx.take_effects();

        for _ in 0..1000 {
            s.on_event(ServerEvent::Keepalive, &mut ctx);
        }
        let effects = ctx.take_effects();
        assert!(!effects.iter().any(|e| matches!(e, Effect::Schedule { .. })));

        // the armed timer finds recent data and waits for the rest of the interval
        fire_last(&mut s, &mut ctx, &armed);
        assert_eq!(s.state(), SessionState::Receiving);
        let effects = ctx.take_effects();
        let (delay, _) = last_timer(&effects).unwrap();
        assert!(delay <= crate::core::DEFAULT_KEEPALIVE);

        // nothing arrived since: the stream stalls
        fire_last(&mut s, &mut ctx, &effects);
        assert_eq!(s.state(), SessionState::Stalling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_down_needs_two_slow_verdicts_in_a_row() {
        let config = Config {
            slowing_enabled: true,
            ..Config::default()
        };
        let mut ctx = context(config);
        let mut s = session(TransportMode::StreamingWs, &mut ctx);
        receiving(&mut s, &mut ctx);
        notices(&mut ctx);
        let slow_requested = |ctx: &mut Context| {
            notices(ctx)
                .iter()
                .any(|n| matches!(n, Notice::SlowRequired { .. }))
        };

        tokio::time::advance(Duration::from_secs(20)).await;
        // mean 10000ms: first slow verdict
        s.on_event(ServerEvent::Sync { elapsed: Duration::ZERO }, &mut ctx);
        assert!(!slow_requested(&mut ctx));
        // caught up: mean 5000ms resets the streak
        s.on_event(ServerEvent::Sync { elapsed: Duration::from_secs(20) }, &mut ctx);
        assert!(!slow_requested(&mut ctx));
        // mean 12500ms: slow again, but only once in a row
        s.on_event(ServerEvent::Sync { elapsed: Duration::ZERO }, &mut ctx);
        assert!(!slow_requested(&mut ctx));
        // mean 16250ms: second in a row
        s.on_event(ServerEvent::Sync { elapsed: Duration::ZERO }, &mut ctx);
        assert!(slow_requested(&mut ctx));
    }

    #[test]
    fn test_closing_ends_the_recovery_budget() {
        let mut ctx = context(Config::default());
        let now = ctx.now();
        let mut s = Session::new(
            SessionParams {
                mode: TransportMode::StreamingWs,
                forced: false,
                orchestrator_phase: Phase::default(),
                recovery: RecoveryBudget::inherit(&RecoveryBudget::default(), true, now),
                bandwidth: Bandwidth::Unlimited,
                heartbeat: None,
            },
            &mut ctx,
        );
        s.recover_session("stream.closed", &mut ctx);
        assert_eq!(
            s.status(TransportMode::StreamingWs),
            ConnectionStatus::TryingRecovery
        );

        s.close_session("create.timeout", false, false, &mut ctx);
        assert_eq!(s.state(), SessionState::Sleep);
        assert!(!s.is_recovering());
        assert_eq!(s.status(TransportMode::StreamingWs), ConnectionStatus::WillRetry);
    }
}
