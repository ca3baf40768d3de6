//! # Orchestrator: owns the session instance and chooses its transport.
//!
//! The [`Orchestrator`] is the synchronous core of a client. It reacts to
//! application calls, inbound transport traffic and fired timers, and turns
//! the session's requests (retry, recover, sense, switch, slow down) into
//! new session instances.
//!
//! ```text
//!  connect() ──► create_session(mode) ──► Session::create_session
//!                                              │
//!         ┌──────────── notices ◄──────────────┘
//!         ▼
//!   Retry        → fresh session, same mode
//!   Recover      → successor instance (inherits id) ─► recover_session
//!   StreamSense  → next mode on the ladder ─► bind (session alive) or create
//!   SwitchReady  → successor instance on the target mode ─► bind / recover
//!   SlowRequired → status = SWITCHING:<polling>, session asked to rebind
//! ```
//!
//! ## Rules
//! - The orchestrator phase is bumped whenever a new session instance is
//!   prepared, on disconnect and on terminal errors. Session requests issued
//!   under an older phase are ignored.
//! - At most one session instance is live. A predecessor is retired
//!   (silently) or closed before its successor starts.
//! - An in-place switch that does not complete within
//!   `switch_check_timeout` is abandoned for a fresh session on the target mode.
//! - Requests submitted while no instance can take them are kept and handed
//!   to the next instance.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::{
    Collaborator, Control, ForcedTransport, Receipt, ServerSession, TransportMode,
};
use crate::core::Config;
use crate::events::{Bus, Event, EventKind};
use crate::policies::RecoveryBudget;
use crate::protocol::{
    Bandwidth, ConnectionId, Inbound, Notification, RequestKind, ServerEvent, SessionId,
    SubscriptionId,
};
use crate::session::{
    ConnectionStatus, Context, Effect, Notice, Phase, Session, SessionParams, SessionState, Timer,
};
use crate::tutor::{
    ConstrainTutor, MessageTutor, PendingRequest, ReconfigureTutor, SubscribeTutor, TutorStep,
    UnsubscribeTutor,
};

pub struct Orchestrator {
    ctx: Context,
    status: TransportMode,
    phase: Phase,
    session: Option<Session>,
    server_session: Option<ServerSession>,
    generation: u64,
    collaborators: Vec<Arc<dyn Collaborator>>,
    forced: Option<ForcedTransport>,
    bandwidth: Bandwidth,
    heartbeat: Option<Duration>,
    heartbeat_token: u64,
    orphans: VecDeque<PendingRequest>,
}

impl Orchestrator {
    pub fn new(config: Config, bus: Bus) -> Self {
        let forced = config.forced_transport;
        let bandwidth = config.requested_bandwidth;
        let heartbeat = config.reverse_heartbeat();
        Self {
            ctx: Context::new(Arc::new(config), bus),
            status: TransportMode::Off,
            phase: Phase::default(),
            session: None,
            server_session: None,
            generation: 0,
            collaborators: Vec::new(),
            forced,
            bandwidth,
            heartbeat,
            heartbeat_token: 0,
            orphans: VecDeque::new(),
        }
    }

    pub fn with_collaborators(mut self, collaborators: Vec<Arc<dyn Collaborator>>) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn add_collaborator(&mut self, collaborator: Arc<dyn Collaborator>) {
        self.collaborators.push(collaborator);
    }

    // ---- inspection ----

    pub fn status(&self) -> TransportMode {
        self.status
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        match &self.session {
            Some(s) => s.status(self.status),
            None => ConnectionStatus::Disconnected,
        }
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(Session::state)
    }

    /// Stream of the current session instance.
    pub fn session_conn(&self) -> Option<ConnectionId> {
        self.session.as_ref().map(Session::conn)
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().and_then(Session::session_id)
    }

    /// Notifications delivered by the current server session.
    pub fn data_count(&self) -> u64 {
        self.session.as_ref().map_or(0, Session::data_count)
    }

    /// Largest control request the server accepts, when it said so.
    pub fn request_limit(&self) -> Option<u64> {
        self.session.as_ref().and_then(Session::request_limit)
    }

    pub fn server_session(&self) -> Option<&ServerSession> {
        self.server_session.as_ref()
    }

    pub fn ws_available(&self) -> bool {
        self.ctx.availability.ws_available()
    }

    pub fn forced_transport(&self) -> Option<ForcedTransport> {
        self.forced
    }

    /// Control requests under supervision.
    pub fn supervised_requests(&self) -> usize {
        self.ctx.tutors.len()
    }

    /// Requests waiting for a session that can send them.
    pub fn queued_requests(&self) -> usize {
        self.orphans.len() + self.session.as_ref().map_or(0, Session::pending_len)
    }

    /// Effects produced since the last call, in order.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        self.ctx.take_effects()
    }

    // ---- application calls ----

    pub fn connect(&mut self) {
        if self.status.is_connected() {
            debug!(status = %self.status, "already connected");
            return;
        }
        let mode = self.initial_mode();
        info!(%mode, forced = ?self.forced, "connecting");
        self.create_session(mode, true, "api");
        self.arm_heartbeat();
        self.drain();
    }

    pub fn disconnect(&mut self) {
        info!(status = %self.status, "disconnecting");
        self.phase = self.phase.next();
        if let Some(s) = self.session.as_mut() {
            s.close_session("api", false, true, &mut self.ctx);
        }
        self.drain();
        self.end(TransportMode::End);
    }

    pub fn force_transport(&mut self, forced: Option<ForcedTransport>) {
        info!(forced = ?forced, "forced transport changed");
        self.forced = forced;
        if let Some(s) = self.session.as_mut() {
            s.set_forced(forced.is_some());
        }
        let Some(forced) = forced else {
            return;
        };
        if !self.status.is_connected() {
            return;
        }
        let current = self.status.steady();
        let target = forced.constrain(current);
        if target != current {
            self.create_session(target, false, "api.forced");
            self.drain();
        }
    }

    pub fn change_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.bandwidth = bandwidth;
        match self.session.as_mut() {
            Some(s) if s.accepts_requests() => {
                let fence = self.ctx.ledger.next_constrain();
                debug!(?bandwidth, fence, "bandwidth change requested");
                s.set_bandwidth(bandwidth);
                s.submit(
                    PendingRequest::new(
                        RequestKind::Constrain { bandwidth, fence },
                        "api",
                        Box::new(ConstrainTutor::new(fence, bandwidth)),
                    ),
                    &mut self.ctx,
                );
            }
            Some(s) => s.set_bandwidth(bandwidth),
            None => {}
        }
        self.drain();
    }

    /// Sets (or with `None` disables) the reverse heartbeat interval.
    pub fn change_reverse_heartbeat(&mut self, interval: Option<Duration>) {
        self.heartbeat = interval.filter(|d| !d.is_zero());
        if let Some(s) = self.session.as_mut() {
            s.set_heartbeat(self.heartbeat);
        }
        if self.status.is_connected() {
            self.arm_heartbeat();
        } else {
            self.heartbeat_token += 1;
        }
    }

    pub fn set_online(&mut self, online: bool) {
        if self.ctx.offline.is_online() != online {
            info!(online, "network availability changed");
        }
        self.ctx.offline.set_online(online);
    }

    /// Submits a tutored operation; it is sent as soon as a session can carry it.
    pub fn submit(&mut self, control: Control) -> Receipt {
        let (pending, receipt) = match control {
            Control::Subscribe {
                subscription,
                params,
            } => {
                self.ctx.ledger.add_subscription(subscription);
                let kind = RequestKind::Subscribe {
                    subscription,
                    params: params.clone(),
                };
                let tutor = SubscribeTutor::new(subscription, params);
                (
                    PendingRequest::new(kind, "api", Box::new(tutor)),
                    Receipt::Subscription(subscription),
                )
            }
            Control::Unsubscribe { subscription } => {
                if self.ctx.ledger.subscription(subscription).is_none() {
                    warn!(%subscription, "unsubscribe of an unknown subscription");
                }
                (
                    PendingRequest::new(
                        RequestKind::Unsubscribe { subscription },
                        "api",
                        Box::new(UnsubscribeTutor::new(subscription)),
                    ),
                    Receipt::Subscription(subscription),
                )
            }
            Control::Reconfigure {
                subscription,
                frequency,
            } => {
                let reconf = self.ctx.ledger.next_reconf(subscription);
                (
                    PendingRequest::new(
                        RequestKind::Reconfigure {
                            subscription,
                            reconf,
                            frequency,
                        },
                        "api",
                        Box::new(ReconfigureTutor::new(subscription, reconf, frequency)),
                    ),
                    Receipt::Reconfiguration {
                        subscription,
                        reconf,
                    },
                )
            }
            Control::Message {
                sequence,
                body,
                ack,
            } => {
                let prog = self.ctx.ledger.next_prog(&sequence);
                let tutor = MessageTutor::new(sequence.clone(), prog, body, ack);
                (
                    PendingRequest::new(tutor.request_kind(), "api", Box::new(tutor)),
                    Receipt::Message { sequence, prog },
                )
            }
        };
        self.route(pending);
        self.drain();
        receipt
    }

    /// Forgets a subscription; requests still in flight for it are given up.
    pub fn remove_subscription(&mut self, subscription: SubscriptionId) {
        if !self.ctx.ledger.remove_subscription(subscription) {
            debug!(%subscription, "removal of an unknown subscription");
        }
        let mut aborted = self
            .ctx
            .tutors
            .abort_where(&mut self.ctx.ledger, |t| t.concerns(subscription));
        if let Some(s) = self.session.as_mut() {
            aborted.extend(s.abort_pending_where(|p| p.tutor.concerns(subscription)));
        }
        let mut keep = VecDeque::with_capacity(self.orphans.len());
        for mut p in self.orphans.drain(..) {
            if p.tutor.concerns(subscription) {
                aborted.extend(p.tutor.notify_abort());
            } else {
                keep.push_back(p);
            }
        }
        self.orphans = keep;
        for n in aborted {
            self.deliver(n);
        }
    }

    // ---- runtime input ----

    pub fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Event {
                event: ServerEvent::RequestOk { request },
                ..
            } => {
                if let Some((resolution, advanced)) = self.ctx.ledger.on_request_ok(request) {
                    trace!(%request, ?resolution, advanced, "request acknowledged");
                }
            }
            Inbound::Event {
                event:
                    ServerEvent::RequestError {
                        request,
                        code,
                        message,
                    },
                ..
            } => {
                warn!(%request, code, %message, "request refused by server");
                self.ctx.ledger.forget(request);
                self.ctx.publish(
                    Event::new(EventKind::RequestAborted)
                        .with_request(request)
                        .with_reason(format!("{code}: {message}")),
                );
                if let Some(n) = self.ctx.tutors.abort_request(request) {
                    self.deliver(n);
                }
                self.deliver(Notification::RequestRejected {
                    request,
                    code,
                    message,
                });
            }
            Inbound::Event { conn, event } => {
                let Some(s) = stream_of(&mut self.session, conn) else {
                    trace!(%conn, event = event.label(), "event from a retired stream");
                    return;
                };
                s.on_event(event, &mut self.ctx);
            }
            Inbound::Failed { conn, error } => {
                let Some(s) = stream_of(&mut self.session, conn) else {
                    trace!(%conn, "failure of a retired stream");
                    return;
                };
                s.on_transport_error(&error, &mut self.ctx);
            }
            Inbound::Closed { conn } => {
                if let Some(s) = stream_of(&mut self.session, conn) {
                    s.on_stream_closed(&mut self.ctx);
                }
            }
            Inbound::Sent { request, failed } => {
                self.ctx.tutors.notify_sender(request, failed);
            }
            Inbound::Network { online } => self.set_online(online),
        }
        self.drain();
    }

    pub fn fire(&mut self, timer: Timer) {
        match timer {
            Timer::Session {
                conn,
                phase,
                timeout,
            } => {
                if let Some(s) = self.session.as_mut() {
                    s.on_timeout(conn, phase, timeout, &mut self.ctx);
                }
            }
            Timer::Switch { phase } => self.on_switch_timeout(phase),
            Timer::Tutor { id } => match self.ctx.tutors.on_timeout(id, &mut self.ctx.ledger) {
                TutorStep::Retransmit(pending) => self.route(pending),
                TutorStep::Moot => {
                    self.ctx
                        .publish(Event::new(EventKind::RequestAborted).with_reason("moot"));
                }
                TutorStep::Done | TutorStep::Stale => {}
            },
            Timer::OfflineReset { token } => {
                if self.ctx.offline.reset(token) {
                    debug!("offline allowance restored");
                }
            }
            Timer::Heartbeat { token } => self.on_heartbeat(token),
        }
        self.drain();
    }

    // ---- notices ----

    fn drain(&mut self) {
        while let Some(notice) = self.ctx.next_notice() {
            self.on_notice(notice);
        }
    }

    fn on_notice(&mut self, notice: Notice) {
        match notice {
            Notice::SessionStarted { conn, session_id } => {
                self.generation += 1;
                let server = ServerSession::new(self.generation, session_id.clone(), conn);
                self.ctx.publish(
                    Event::new(EventKind::SessionCreated)
                        .with_session(&session_id)
                        .with_connection(conn)
                        .with_mode(self.status.steady()),
                );
                for c in &self.collaborators {
                    trace!(collaborator = c.name(), "session start");
                    c.on_session_start(&server);
                }
                self.server_session = Some(server);
            }
            Notice::SessionRecovered { conn, session_id } => {
                if let Some(server) = self.server_session.as_mut() {
                    server.repoint(conn);
                }
                self.ctx.publish(
                    Event::new(EventKind::SessionRecovered)
                        .with_session(&session_id)
                        .with_connection(conn),
                );
            }
            Notice::StreamBound { conn } => {
                let mut ev = Event::new(EventKind::SessionBound)
                    .with_connection(conn)
                    .with_mode(self.status.steady());
                if let Some(server) = self.server_session.as_mut() {
                    server.repoint(conn);
                    ev = ev.with_session(server.session_id());
                }
                self.ctx.publish(ev);
            }
            Notice::SessionClosed {
                session_id,
                reason,
                recovery_scheduled,
            } => self.on_session_closed(session_id, &reason, recovery_scheduled),
            Notice::Retry { phase, cause } => {
                if self.accepts(phase) {
                    let mode = self.respect_availability(self.status.steady());
                    self.create_session(mode, true, &cause);
                }
            }
            Notice::Recover { phase, cause } => {
                if self.accepts(phase) {
                    let mode = self.status.steady();
                    info!(%mode, %cause, "recovering session");
                    self.prepare_session(mode, true, true);
                    if let Some(s) = self.session.as_mut() {
                        s.recover_session(&cause, &mut self.ctx);
                    }
                }
            }
            Notice::StreamSense { phase, cause } => {
                if self.accepts(phase) {
                    self.stream_sense(&cause);
                }
            }
            Notice::SwitchReady {
                phase,
                cause,
                start_recovery,
            } => {
                if self.accepts(phase) {
                    self.switch_ready(&cause, start_recovery);
                }
            }
            Notice::SlowRequired { phase } => {
                if self.accepts(phase) {
                    self.slow_down();
                }
            }
            Notice::Deliver(n) => self.deliver(n),
            Notice::Rejected(rejection) => {
                self.ctx.publish(
                    Event::new(EventKind::ServerRejected).with_reason(rejection.as_message()),
                );
                self.end(TransportMode::End);
            }
            Notice::Violation => self.end(TransportMode::Error),
            Notice::ClientIp(ip) => {
                if self.ctx.availability.observe_client_ip(&ip) {
                    info!(%ip, "client address changed; websocket enabled again");
                }
            }
            Notice::BandwidthApplied(bandwidth) => {
                trace!(?bandwidth, "server bandwidth");
            }
        }
    }

    fn accepts(&self, phase: Phase) -> bool {
        if phase != self.phase {
            trace!(
                issued = phase.get(),
                current = self.phase.get(),
                "stale session request"
            );
            return false;
        }
        true
    }

    fn on_session_closed(
        &mut self,
        session_id: Option<SessionId>,
        reason: &str,
        recovery_scheduled: bool,
    ) {
        if let Some(server) = self.server_session.as_mut() {
            server.close();
        }
        let mut ev = Event::new(EventKind::SessionClosed).with_reason(reason);
        if let Some(id) = &session_id {
            ev = ev.with_session(id);
        }
        self.ctx.publish(ev);

        if session_id.is_some() {
            for c in &self.collaborators {
                c.on_session_close(recovery_scheduled);
            }
        }
        for n in self.ctx.tutors.abort_all(&mut self.ctx.ledger) {
            self.deliver(n);
        }
        self.ctx.ledger.reset();
    }

    fn deliver(&mut self, n: Notification) {
        self.ctx.ledger.on_notification(&n);
        for c in &self.collaborators {
            c.on_notification(&n);
        }
    }

    // ---- session instances ----

    /// Starts a session on `mode`.
    ///
    /// With a live server session and `avoid_switch == false`, the running
    /// session is asked to switch in place. Otherwise the predecessor is
    /// closed and a fresh server session is created.
    fn create_session(&mut self, mode: TransportMode, avoid_switch: bool, cause: &str) {
        let alive = self.session.as_ref().is_some_and(Session::is_alive);
        if alive && !avoid_switch {
            info!(from = %self.status, to = %mode, cause, "switching transport in place");
            self.change_status(mode.switching());
            self.arm_switch_timeout();
            let phase = self.phase;
            if let Some(s) = self.session.as_mut() {
                s.request_switch(phase, cause, false, &mut self.ctx);
            }
            return;
        }

        let old_session = self
            .session
            .as_ref()
            .and_then(|s| s.session_id().cloned());
        if let Some(s) = self.session.as_mut() {
            if s.accepts_requests() {
                s.close_session("new.session", false, true, &mut self.ctx);
            }
        }
        self.drain();

        self.change_status(mode);
        self.prepare_session(mode, false, false);
        if let Some(s) = self.session.as_mut() {
            s.create_session(old_session, cause, &mut self.ctx);
        }
    }

    /// Replaces the session instance.
    ///
    /// With `inherit`, the successor takes over the server session of its
    /// predecessor, which is retired without telling the server.
    fn prepare_session(&mut self, mode: TransportMode, inherit: bool, recovering: bool) {
        self.phase = self.phase.next();
        let now = self.ctx.now();
        let mut previous = self.session.take();
        let budget = previous
            .as_ref()
            .map(Session::recovery)
            .unwrap_or_default();

        let mut next = Session::new(
            SessionParams {
                mode,
                forced: self.forced.is_some(),
                orchestrator_phase: self.phase,
                recovery: RecoveryBudget::inherit(&budget, recovering, now),
                bandwidth: self.bandwidth,
                heartbeat: self.heartbeat,
            },
            &mut self.ctx,
        );
        if let Some(old) = previous.as_mut() {
            if inherit {
                next.inherit_from(old);
            }
            old.retire(&mut self.ctx);
        }
        next.enqueue(self.orphans.drain(..));
        trace!(%mode, inherit, recovering, phase = self.phase.get(), "session instance prepared");
        self.session = Some(next);
    }

    fn stream_sense(&mut self, cause: &str) {
        let target = self.next_sense_mode();
        let alive = self.session.as_ref().is_some_and(Session::is_alive);
        info!(from = %self.status, to = %target, cause, alive, "sensing transport");
        if !alive {
            self.create_session(target, true, cause);
            return;
        }
        self.change_status(target);
        self.prepare_session(target, true, false);
        if let Some(s) = self.session.as_mut() {
            s.bind_session(&format!("{cause}.sense"), &mut self.ctx);
        }
        self.publish_switch(target, cause);
    }

    fn switch_ready(&mut self, cause: &str, start_recovery: bool) {
        let target = self.respect_availability(self.status.steady());
        let alive = self.session.as_ref().is_some_and(Session::is_alive);
        if !alive {
            info!(to = %target, cause, "switch target reached without a session; creating");
            self.create_session(target, true, cause);
            return;
        }
        info!(to = %target, cause, start_recovery, "switching transport");
        self.change_status(target);
        self.prepare_session(target, true, start_recovery);
        if let Some(s) = self.session.as_mut() {
            if start_recovery {
                s.recover_session(cause, &mut self.ctx);
            } else {
                s.bind_session(&format!("switch.{cause}"), &mut self.ctx);
            }
        }
        self.publish_switch(target, cause);
    }

    fn slow_down(&mut self) {
        match self.status.steady().next_slow() {
            Ok(target) => {
                warn!(from = %self.status, to = %target, "slowing down to polling");
                self.change_status(target.switching());
                self.arm_switch_timeout();
                let phase = self.phase;
                if let Some(s) = self.session.as_mut() {
                    s.request_slow(phase, &mut self.ctx);
                }
            }
            Err(e) => debug!(error = %e, "slow-down not applicable"),
        }
    }

    fn on_switch_timeout(&mut self, phase: Phase) {
        if phase != self.phase || !self.status.is_switching() {
            trace!("stale switch timer");
            return;
        }
        let target = self.status.steady();
        warn!(to = %target, "in-place switch timed out; creating a fresh session");
        self.create_session(target, true, "switch.timeout");
    }

    fn on_heartbeat(&mut self, token: u64) {
        if token != self.heartbeat_token || !self.status.is_connected() {
            return;
        }
        if let Some(s) = self.session.as_mut() {
            if !s.send_heartbeat(&mut self.ctx) {
                trace!("heartbeat skipped; no control link");
            }
        }
        self.arm_heartbeat();
    }

    fn arm_heartbeat(&mut self) {
        self.heartbeat_token += 1;
        if let Some(interval) = self.heartbeat {
            self.ctx.schedule(
                interval,
                Timer::Heartbeat {
                    token: self.heartbeat_token,
                },
            );
        }
    }

    fn arm_switch_timeout(&mut self) {
        let delay = self.ctx.config.switch_check_timeout;
        self.ctx
            .schedule(delay, Timer::Switch { phase: self.phase });
    }

    fn route(&mut self, pending: PendingRequest) {
        match self.session.as_mut() {
            Some(s) if s.accepts_requests() => s.submit(pending, &mut self.ctx),
            _ => {
                trace!(kind = pending.kind.label(), "request kept for the next session");
                self.orphans.push_back(pending);
            }
        }
    }

    fn end(&mut self, status: TransportMode) {
        self.phase = self.phase.next();
        self.change_status(status);
        self.heartbeat_token += 1;
        if let Some(server) = self.server_session.as_mut() {
            server.close();
        }
        let mut aborted = Vec::new();
        for mut p in self.orphans.drain(..) {
            aborted.extend(p.tutor.notify_abort());
        }
        for n in aborted {
            self.deliver(n);
        }
    }

    fn change_status(&mut self, status: TransportMode) {
        if self.status != status {
            debug!(from = %self.status, to = %status, "orchestrator status");
            self.status = status;
        }
    }

    fn publish_switch(&self, mode: TransportMode, cause: &str) {
        self.ctx.publish(
            Event::new(EventKind::TransportSwitched)
                .with_mode(mode)
                .with_reason(cause),
        );
    }

    fn initial_mode(&self) -> TransportMode {
        let mode = match self.forced {
            Some(forced) => forced.constrain(TransportMode::StreamingWs),
            None => TransportMode::StreamingWs,
        };
        self.respect_availability(mode)
    }

    fn next_sense_mode(&self) -> TransportMode {
        let frozen = self.forced.is_some_and(ForcedTransport::is_frozen);
        let mut next = self.status.next_sense(frozen);
        if let Some(forced) = self.forced {
            next = forced.constrain(next);
        }
        self.respect_availability(next)
    }

    /// Falls back to HTTP while WebSocket is disabled, unless WebSocket is forced.
    fn respect_availability(&self, mode: TransportMode) -> TransportMode {
        let ws_forced = self.forced.is_some_and(|f| !f.is_http());
        if mode.is_ws() && !ws_forced && !self.ctx.availability.ws_available() {
            return TransportMode::steady_for(mode.is_polling(), true);
        }
        mode.steady()
    }
}

/// Current session instance, if `conn` is its stream.
fn stream_of(session: &mut Option<Session>, conn: ConnectionId) -> Option<&mut Session> {
    session.as_mut().filter(|s| s.conn() == conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionOk;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Config::new("https://push.example.com"), Bus::new(64))
    }

    fn answer(o: &mut Orchestrator, event: ServerEvent) {
        let conn = o.session_conn().unwrap();
        o.handle_inbound(Inbound::Event { conn, event });
    }

    #[test]
    fn test_connect_starts_with_ws_streaming() {
        let mut o = orchestrator();
        o.connect();
        assert_eq!(o.status(), TransportMode::StreamingWs);
        assert_eq!(o.session_state(), Some(SessionState::Creating));
        assert_eq!(o.connection_status(), ConnectionStatus::Connecting);
        let effects = o.take_effects();
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Send(r) if matches!(r.kind, RequestKind::Create { .. })
        )));
    }

    #[test]
    fn test_connect_honours_forced_transport() {
        let mut config = Config::new("x");
        config.forced_transport = Some(ForcedTransport::HttpPolling);
        let mut o = Orchestrator::new(config, Bus::new(8));
        o.connect();
        assert_eq!(o.status(), TransportMode::PollingHttp);
    }

    #[test]
    fn test_disconnect_destroys_session() {
        let mut o = orchestrator();
        o.connect();
        answer(&mut o, ServerEvent::ConnectionOk(ConnectionOk::new("S1")));
        o.take_effects();
        o.disconnect();
        assert_eq!(o.status(), TransportMode::End);
        assert_eq!(o.session_state(), Some(SessionState::Off));
        assert!(!o.server_session().unwrap().is_open());
        let effects = o.take_effects();
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Send(r) if r.kind == RequestKind::Destroy
        )));
    }

    #[test]
    fn test_requests_before_connect_are_kept() {
        let mut o = orchestrator();
        let receipt = o.submit(Control::Subscribe {
            subscription: SubscriptionId(7),
            params: Default::default(),
        });
        assert_eq!(receipt, Receipt::Subscription(SubscriptionId(7)));
        assert_eq!(o.queued_requests(), 1);
        o.connect();
        answer(&mut o, ServerEvent::ConnectionOk(ConnectionOk::new("S1")));
        assert_eq!(o.queued_requests(), 0);
        assert_eq!(o.supervised_requests(), 1);
    }

    #[test]
    fn test_event_from_retired_stream_is_dropped() {
        let mut o = orchestrator();
        o.connect();
        let old = o.session_conn().unwrap();
        answer(&mut o, ServerEvent::ConnectionOk(ConnectionOk::new("S1")));
        answer(&mut o, ServerEvent::Loop { pause: Duration::ZERO });
        let effects = o.take_effects();
        let timer = effects
            .iter()
            .rev()
            .find_map(|e| match e {
                Effect::Schedule { timer, .. } => Some(timer.clone()),
                _ => None,
            })
            .unwrap();
        o.fire(timer);
        assert_ne!(o.session_conn(), Some(old));
        o.handle_inbound(Inbound::Event {
            conn: old,
            event: ServerEvent::Interrupted,
        });
        assert_eq!(o.session_state(), Some(SessionState::FirstBinding));
    }

    #[test]
    fn test_request_error_aborts_message() {
        use crate::protocol::MessageSequence;
        use std::sync::Mutex;

        #[derive(Default)]
        struct Sink(Mutex<Vec<Notification>>);
        impl Collaborator for Sink {
            fn on_notification(&self, n: &Notification) {
                self.0.lock().unwrap().push(n.clone());
            }
        }

        let sink = Arc::new(Sink::default());
        let mut o = orchestrator().with_collaborators(vec![sink.clone() as Arc<dyn Collaborator>]);
        o.connect();
        answer(&mut o, ServerEvent::ConnectionOk(ConnectionOk::new("S1")));
        o.take_effects();
        o.submit(Control::Message {
            sequence: MessageSequence::named("chat"),
            body: "hi".into(),
            ack: true,
        });
        let request = o
            .take_effects()
            .into_iter()
            .find_map(|e| match e {
                Effect::Send(r) => Some(r.id),
                _ => None,
            })
            .unwrap();
        answer(
            &mut o,
            ServerEvent::RequestError {
                request,
                code: 32,
                message: "refused".into(),
            },
        );
        let got = sink.0.lock().unwrap();
        assert!(matches!(got[0], Notification::MessageAborted { sent: false, .. }));
        assert!(matches!(got[1], Notification::RequestRejected { code: 32, .. }));
        assert_eq!(o.supervised_requests(), 0);
    }
}
