//! End-to-end scenarios driven against the synchronous core.
//!
//! Each test plays the part of both the transport (answering requests with
//! server events) and the runtime (firing the timers the core scheduled).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pushvisor::{
    Bus, Collaborator, Config, ConnectionOk, ConnectionStatus, Control, ControlRequest, Effect,
    Event, EventKind, ForcedTransport, Frequency, Inbound, JitterPolicy, Notification, Orchestrator, RequestKind,
    ServerEvent, ServerSession, SessionState, SubscriptionId, TimeoutKind, Timer, TransportError,
    TransportMode,
};
use tokio::sync::broadcast;

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
    notifications: Mutex<Vec<Notification>>,
}

impl Collaborator for Recorder {
    fn on_session_start(&self, session: &ServerSession) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("start:{}", session.session_id().as_str()));
    }

    fn on_session_close(&self, recovery_scheduled: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("close:{recovery_scheduled}"));
    }

    fn on_notification(&self, n: &Notification) {
        self.notifications.lock().unwrap().push(n.clone());
    }
}

struct Harness {
    core: Orchestrator,
    events: broadcast::Receiver<Event>,
    recorder: Arc<Recorder>,
    effects: Vec<Effect>,
}

impl Harness {
    fn new(config: Config) -> Self {
        let bus = Bus::new(1024);
        let events = bus.subscribe();
        let recorder = Arc::new(Recorder::default());
        let core = Orchestrator::new(config, bus)
            .with_collaborators(vec![recorder.clone() as Arc<dyn Collaborator>]);
        Self {
            core,
            events,
            recorder,
            effects: Vec::new(),
        }
    }

    fn collect(&mut self) {
        self.effects.extend(self.core.take_effects());
    }

    fn connect(&mut self) {
        self.core.connect();
        self.collect();
    }

    /// Delivers `event` on the stream of the current session instance.
    fn answer(&mut self, event: ServerEvent) {
        let conn = self.core.session_conn().expect("no session instance");
        self.core.handle_inbound(Inbound::Event { conn, event });
        self.collect();
    }

    fn inbound(&mut self, inbound: Inbound) {
        self.core.handle_inbound(inbound);
        self.collect();
    }

    fn fire(&mut self, timer: Timer) {
        self.core.fire(timer);
        self.collect();
    }

    /// Requests sent since the last call.
    fn sent(&mut self) -> Vec<ControlRequest> {
        let sent = self
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(r) => Some(r.clone()),
                _ => None,
            })
            .collect();
        self.effects.retain(|e| !matches!(e, Effect::Send(_)));
        sent
    }

    /// Removes and returns the last pending session timer of `kind`.
    fn session_timer(&mut self, kind: TimeoutKind) -> (Duration, Timer) {
        let at = self
            .effects
            .iter()
            .rposition(|e| {
                matches!(e, Effect::Schedule { timer: Timer::Session { timeout, .. }, .. } if timeout.kind == kind)
            })
            .unwrap_or_else(|| panic!("no {kind:?} timer in {:?}", self.effects));
        match self.effects.remove(at) {
            Effect::Schedule { delay, timer } => (delay, timer),
            _ => unreachable!(),
        }
    }

    fn timer_where(&mut self, pred: impl Fn(&Timer) -> bool) -> Timer {
        let at = self
            .effects
            .iter()
            .rposition(|e| matches!(e, Effect::Schedule { timer, .. } if pred(timer)))
            .expect("timer not scheduled");
        match self.effects.remove(at) {
            Effect::Schedule { timer, .. } => timer,
            _ => unreachable!(),
        }
    }

    /// Creates the session and brings its first stream to `Receiving`.
    fn establish(&mut self, session_id: &str) {
        self.connect();
        self.answer(ServerEvent::ConnectionOk(ConnectionOk::new(session_id)));
        self.answer(ServerEvent::Loop {
            pause: Duration::ZERO,
        });
        let (_, pause) = self.session_timer(TimeoutKind::Pause);
        self.fire(pause);
        self.answer(ServerEvent::ConnectionOk(ConnectionOk::new(session_id)));
        assert_eq!(self.core.session_state(), Some(SessionState::Receiving));
        self.effects.clear();
    }

    fn drain_events(&mut self) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }
}

fn update(item: u32) -> ServerEvent {
    ServerEvent::Notification(Notification::Update {
        subscription: SubscriptionId(1),
        item,
        values: vec![Some(Arc::from(format!("v{item}")))],
    })
}

#[test]
fn test_create_timeout_retries_immediately_on_same_transport() {
    let config = Config::new("https://push.example.com");
    let retry = config.retry_delay;
    let mut h = Harness::new(config);
    h.connect();

    let create = h.sent();
    assert!(matches!(create[0].kind, RequestKind::Create { .. }));
    let (delay, connect) = h.session_timer(TimeoutKind::Connect);
    assert_eq!(delay, retry);

    h.fire(connect);
    assert_eq!(h.core.session_state(), Some(SessionState::Sleep));
    assert_eq!(h.core.connection_status(), ConnectionStatus::WillRetry);
    assert!(h.sent().is_empty(), "no destroy without a session id");
    let (delay, immediate) = h.session_timer(TimeoutKind::Immediate);
    assert_eq!(delay, Duration::ZERO);

    h.fire(immediate);
    let again = h.sent();
    assert_eq!(again.len(), 1);
    assert!(matches!(again[0].kind, RequestKind::Create { .. }));
    assert_ne!(again[0].conn, create[0].conn);
    assert_eq!(h.core.status(), TransportMode::StreamingWs);
    assert_eq!(h.core.connection_status(), ConnectionStatus::Connecting);
}

#[test]
fn test_broken_stream_recovers_with_progress() {
    let mut config = Config::new("https://push.example.com");
    config.first_retry_jitter = JitterPolicy::None;
    let first_retry = config.first_retry_max_delay;
    let mut h = Harness::new(config);
    h.establish("S1");

    for item in 1..=3 {
        h.answer(update(item));
    }
    assert_eq!(h.core.data_count(), 3);

    let conn = h.core.session_conn().unwrap();
    h.inbound(Inbound::Failed {
        conn,
        error: TransportError::Broken {
            reason: "reset by peer".into(),
        },
    });
    assert_eq!(h.core.session_state(), Some(SessionState::Sleep));
    assert_eq!(h.core.connection_status(), ConnectionStatus::TryingRecovery);
    assert!(h.sent().is_empty(), "a recoverable session is not destroyed");

    let (delay, retry) = h.session_timer(TimeoutKind::FirstRetry);
    assert_eq!(delay, first_retry);
    h.fire(retry);

    let recover = h.sent();
    assert_eq!(recover.len(), 1);
    assert_eq!(recover[0].kind, RequestKind::Recover { progress: 3 });
    assert_eq!(recover[0].session_id.as_ref().map(|s| s.as_str()), Some("S1"));
    assert_eq!(h.core.connection_status(), ConnectionStatus::TryingRecovery);

    h.answer(ServerEvent::ConnectionOk(ConnectionOk::new("S1")));
    assert_eq!(h.core.session_state(), Some(SessionState::Receiving));
    assert_eq!(
        h.core.connection_status(),
        ConnectionStatus::Connected(TransportMode::StreamingWs)
    );

    // the server replays two notifications the client already has
    h.answer(ServerEvent::Progress { count: 1 });
    for item in 2..=4 {
        h.answer(update(item));
    }
    assert_eq!(h.core.data_count(), 4);
    assert_eq!(h.recorder.notifications.lock().unwrap().len(), 4);
    assert_eq!(*h.recorder.calls.lock().unwrap(), vec!["start:S1".to_string()]);
    assert!(h.drain_events().contains(&EventKind::SessionRecovered));
}

#[test]
fn test_broken_stream_without_recovery_recreates() {
    let mut config = Config::new("https://push.example.com");
    config.first_retry_jitter = JitterPolicy::None;
    config.session_recovery_timeout = Duration::ZERO;
    let mut h = Harness::new(config);
    h.establish("S1");

    let conn = h.core.session_conn().unwrap();
    h.inbound(Inbound::Closed { conn });
    assert_eq!(h.core.connection_status(), ConnectionStatus::WillRetry);
    let destroy = h.sent();
    assert_eq!(destroy[0].kind, RequestKind::Destroy);
    assert_eq!(*h.recorder.calls.lock().unwrap(), vec!["start:S1", "close:true"]);

    let (_, retry) = h.session_timer(TimeoutKind::FirstRetry);
    h.fire(retry);
    let create = h.sent();
    assert!(matches!(create[0].kind, RequestKind::Create { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_lagging_stream_slows_down_to_polling() {
    let mut config = Config::new("https://push.example.com");
    config.slowing_enabled = true;
    let mut h = Harness::new(config);
    h.establish("S1");

    // 10s behind the server clock on every report: mean 5000ms, 7500ms, 8750ms
    tokio::time::advance(Duration::from_secs(10)).await;
    h.answer(ServerEvent::Sync {
        elapsed: Duration::ZERO,
    });
    assert_eq!(h.core.status(), TransportMode::StreamingWs);

    tokio::time::advance(Duration::from_secs(10)).await;
    h.answer(ServerEvent::Sync {
        elapsed: Duration::from_secs(10),
    });
    assert_eq!(
        h.core.status(),
        TransportMode::StreamingWs,
        "one slow verdict is not enough"
    );
    assert!(h.sent().is_empty());

    tokio::time::advance(Duration::from_secs(10)).await;
    h.answer(ServerEvent::Sync {
        elapsed: Duration::from_secs(20),
    });
    assert_eq!(h.core.status(), TransportMode::SwitchingPollingWs);
    let rebind = h.sent();
    assert!(rebind.iter().any(|r| r.kind == RequestKind::ForceRebind));
    h.timer_where(|t| matches!(t, Timer::Switch { .. }));

    h.answer(ServerEvent::Loop {
        pause: Duration::ZERO,
    });
    assert_eq!(h.core.status(), TransportMode::PollingWs);
    let bind = h.sent();
    let bind = bind
        .iter()
        .find(|r| r.kind == RequestKind::Bind)
        .expect("bind on the polling transport");
    assert!(bind.flags.polling);
    assert!(!bind.flags.http);
    assert_eq!(bind.session_id.as_ref().map(|s| s.as_str()), Some("S1"));
    assert_eq!(h.core.session_state(), Some(SessionState::FirstBinding));
    assert!(h.drain_events().contains(&EventKind::SlowDetected));
}

#[test]
fn test_unopenable_websocket_falls_back_to_http() {
    let mut h = Harness::new(Config::new("https://push.example.com"));
    h.connect();
    let conn = h.core.session_conn().unwrap();
    h.sent();

    h.inbound(Inbound::Failed {
        conn,
        error: TransportError::Unopenable {
            reason: "handshake refused".into(),
        },
    });
    assert!(!h.core.ws_available());
    assert_eq!(h.core.status(), TransportMode::StreamingHttp);
    let create = h.sent();
    assert_eq!(create.len(), 1);
    assert!(matches!(create[0].kind, RequestKind::Create { .. }));
    assert!(create[0].flags.http);
    assert!(!create[0].flags.polling);
    // no server session existed, so collaborators heard nothing
    assert!(h.recorder.calls.lock().unwrap().is_empty());
}

#[test]
fn test_silent_first_stream_senses_next_transport() {
    let mut h = Harness::new(Config::new("https://push.example.com"));
    h.connect();
    h.answer(ServerEvent::ConnectionOk(ConnectionOk::new("S1")));
    h.answer(ServerEvent::Loop {
        pause: Duration::ZERO,
    });
    let (_, pause) = h.session_timer(TimeoutKind::Pause);
    h.fire(pause);
    h.sent();

    let (_, bind) = h.session_timer(TimeoutKind::Bind);
    h.fire(bind);
    assert_eq!(h.core.status(), TransportMode::StreamingHttp);
    let sent = h.sent();
    let bind = sent.iter().find(|r| r.kind == RequestKind::Bind).unwrap();
    assert!(bind.flags.http);
    assert_eq!(bind.session_id.as_ref().map(|s| s.as_str()), Some("S1"));
    assert!(h.drain_events().contains(&EventKind::TransportSwitched));
}

#[test]
fn test_timers_of_a_previous_phase_are_ignored() {
    let mut h = Harness::new(Config::new("https://push.example.com"));
    h.connect();
    let (_, connect) = h.session_timer(TimeoutKind::Connect);
    h.core.disconnect();
    h.collect();
    h.effects.clear();

    h.fire(connect);
    h.fire(Timer::Switch {
        phase: Default::default(),
    });
    assert!(h.effects.is_empty());
    assert_eq!(h.core.status(), TransportMode::End);
    assert_eq!(h.core.connection_status(), ConnectionStatus::Disconnected);
}

#[test]
fn test_unconfirmed_subscribe_is_retransmitted_until_acknowledged() {
    let mut h = Harness::new(Config::new("https://push.example.com"));
    h.establish("S1");

    h.core.submit(Control::Subscribe {
        subscription: SubscriptionId(1),
        params: Default::default(),
    });
    h.collect();
    let first = h.sent();
    assert!(matches!(first[0].kind, RequestKind::Subscribe { .. }));
    let tutor = h.timer_where(|t| matches!(t, Timer::Tutor { .. }));

    h.fire(tutor);
    let again = h.sent();
    assert_eq!(again.len(), 1);
    assert!(matches!(again[0].kind, RequestKind::Subscribe { .. }));
    assert_ne!(again[0].id, first[0].id);
    assert!(h.drain_events().contains(&EventKind::RequestRetransmitted));

    h.answer(ServerEvent::Notification(Notification::SubscriptionOk {
        subscription: SubscriptionId(1),
    }));
    let tutor = h.timer_where(|t| matches!(t, Timer::Tutor { .. }));
    h.fire(tutor);
    assert!(h.sent().is_empty());
    assert_eq!(h.core.supervised_requests(), 0);
}

#[test]
fn test_superseded_reconfiguration_is_not_retransmitted() {
    let mut h = Harness::new(Config::new("https://push.example.com"));
    h.establish("S1");
    h.core.submit(Control::Subscribe {
        subscription: SubscriptionId(1),
        params: Default::default(),
    });
    h.collect();
    h.effects.clear();

    let r1 = h.core.submit(Control::Reconfigure {
        subscription: SubscriptionId(1),
        frequency: Frequency::Limited(1.0),
    });
    h.collect();
    let first_tutor = h.timer_where(|t| matches!(t, Timer::Tutor { .. }));
    let r2 = h.core.submit(Control::Reconfigure {
        subscription: SubscriptionId(1),
        frequency: Frequency::Limited(2.0),
    });
    h.collect();
    assert_ne!(r1, r2);
    let second = h.sent().pop().unwrap();

    h.fire(first_tutor);
    assert!(h.sent().is_empty());
    assert!(h.drain_events().contains(&EventKind::RequestAborted));

    h.answer(ServerEvent::RequestOk { request: second.id });
    let second_tutor = h.timer_where(|t| matches!(t, Timer::Tutor { .. }));
    h.fire(second_tutor);
    assert!(h.sent().is_empty());
}

#[test]
fn test_offline_defers_repeated_creates() {
    let mut h = Harness::new(Config::new("https://push.example.com"));
    h.core.set_online(false);
    h.connect();
    assert_eq!(h.sent().len(), 1);
    let reset = h.timer_where(|t| matches!(t, Timer::OfflineReset { .. }));

    let (_, connect) = h.session_timer(TimeoutKind::Connect);
    h.fire(connect);
    let (_, immediate) = h.session_timer(TimeoutKind::Immediate);
    h.fire(immediate);
    assert!(h.sent().is_empty(), "second create deferred while offline");
    assert_eq!(h.core.connection_status(), ConnectionStatus::WillRetry);
    let (_, offline) = h.session_timer(TimeoutKind::Offline);

    h.fire(reset);
    h.fire(offline);
    let create = h.sent();
    assert_eq!(create.len(), 1);
    assert!(matches!(create[0].kind, RequestKind::Create { .. }));
}

#[test]
fn test_reverse_heartbeat_needs_a_session() {
    let mut config = Config::new("https://push.example.com");
    config.reverse_heartbeat_interval = Duration::from_secs(2);
    let mut h = Harness::new(config);
    h.connect();
    h.sent();
    let early = h.timer_where(|t| matches!(t, Timer::Heartbeat { .. }));
    h.fire(early);
    assert!(h.sent().is_empty());

    h.answer(ServerEvent::ConnectionOk(ConnectionOk::new("S1")));
    h.sent();
    let beat = h.timer_where(|t| matches!(t, Timer::Heartbeat { .. }));
    h.fire(beat);
    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, RequestKind::Heartbeat);
    h.timer_where(|t| matches!(t, Timer::Heartbeat { .. }));
}

#[test]
fn test_taken_over_session_is_terminal() {
    let mut h = Harness::new(Config::new("https://push.example.com"));
    h.establish("S1");
    h.core.submit(Control::Message {
        sequence: Default::default(),
        body: "late".into(),
        ack: false,
    });
    h.collect();

    h.answer(ServerEvent::End(pushvisor::EndCause::TakenOver {
        code: 41,
        message: "another client".into(),
    }));
    assert_eq!(h.core.status(), TransportMode::End);
    assert_eq!(h.core.connection_status(), ConnectionStatus::Disconnected);
    assert!(h.sent().iter().all(|r| r.kind != RequestKind::Destroy));
    assert_eq!(h.core.supervised_requests(), 0);
    assert!(h.drain_events().contains(&EventKind::ServerRejected));
}

#[test]
fn test_forced_transport_switches_in_place_at_next_loop() {
    let mut h = Harness::new(Config::new("https://push.example.com"));
    h.establish("S1");

    h.core.force_transport(Some(ForcedTransport::Http));
    h.collect();
    assert_eq!(h.core.status(), TransportMode::SwitchingStreamingHttp);
    let rebind = h.sent();
    assert!(rebind.iter().any(|r| r.kind == RequestKind::ForceRebind));
    h.timer_where(|t| matches!(t, Timer::Switch { .. }));

    h.answer(ServerEvent::Loop {
        pause: Duration::ZERO,
    });
    assert_eq!(h.core.status(), TransportMode::StreamingHttp);
    let sent = h.sent();
    assert!(sent.iter().all(|r| r.kind != RequestKind::Destroy));
    let bind = sent.iter().find(|r| r.kind == RequestKind::Bind).unwrap();
    assert!(bind.flags.http);
    assert_eq!(bind.session_id.as_ref().map(|s| s.as_str()), Some("S1"));
    assert_eq!(*h.recorder.calls.lock().unwrap(), vec!["start:S1".to_string()]);
}

#[test]
fn test_switch_not_granted_in_time_starts_fresh_session() {
    let mut h = Harness::new(Config::new("https://push.example.com"));
    h.establish("S1");

    h.core.force_transport(Some(ForcedTransport::Http));
    h.collect();
    h.sent();
    let switch = h.timer_where(|t| matches!(t, Timer::Switch { .. }));

    // the server never loops the WebSocket stream
    h.fire(switch);
    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].kind, RequestKind::Destroy);
    assert_eq!(sent[0].session_id.as_ref().map(|s| s.as_str()), Some("S1"));
    assert!(matches!(sent[1].kind, RequestKind::Create { .. }));
    assert!(sent[1].flags.http);
    assert_eq!(h.core.status(), TransportMode::StreamingHttp);
    assert_eq!(h.core.connection_status(), ConnectionStatus::Connecting);
}

#[test]
fn test_unanswered_recovery_is_resent_while_budget_lasts() {
    let mut config = Config::new("https://push.example.com");
    config.first_retry_jitter = JitterPolicy::None;
    let mut h = Harness::new(config);
    h.establish("S1");
    h.answer(update(1));

    let conn = h.core.session_conn().unwrap();
    h.inbound(Inbound::Closed { conn });
    let (_, retry) = h.session_timer(TimeoutKind::FirstRetry);
    h.fire(retry);
    let first = h.sent();
    assert_eq!(first[0].kind, RequestKind::Recover { progress: 1 });

    let (_, connect) = h.session_timer(TimeoutKind::Connect);
    h.fire(connect);
    let again = h.sent();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].kind, RequestKind::Recover { progress: 1 });
    assert_eq!(again[0].session_id.as_ref().map(|s| s.as_str()), Some("S1"));
    assert_ne!(again[0].conn, first[0].conn);
    assert_eq!(h.core.session_state(), Some(SessionState::Creating));
    assert_eq!(h.core.connection_status(), ConnectionStatus::TryingRecovery);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_recovery_budget_falls_back_to_fresh_session() {
    let mut config = Config::new("https://push.example.com");
    config.first_retry_jitter = JitterPolicy::None;
    let budget = config.session_recovery_timeout;
    let connect_timeout = config.retry_delay;
    let mut h = Harness::new(config);
    h.establish("S1");

    let conn = h.core.session_conn().unwrap();
    h.inbound(Inbound::Failed {
        conn,
        error: TransportError::Broken {
            reason: "reset by peer".into(),
        },
    });
    let (_, retry) = h.session_timer(TimeoutKind::FirstRetry);
    h.fire(retry);
    assert!(matches!(h.sent()[..], [ControlRequest { kind: RequestKind::Recover { .. }, .. }]));

    let mut waited = Duration::ZERO;
    loop {
        let (_, connect) = h.session_timer(TimeoutKind::Connect);
        tokio::time::advance(connect_timeout).await;
        waited += connect_timeout;
        h.fire(connect);
        if waited >= budget {
            break;
        }
        assert!(matches!(h.sent()[..], [ControlRequest { kind: RequestKind::Recover { .. }, .. }]));
    }

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, RequestKind::Destroy);
    assert_eq!(h.core.session_state(), Some(SessionState::Sleep));
    assert_eq!(h.core.connection_status(), ConnectionStatus::WillRetry);

    let (delay, immediate) = h.session_timer(TimeoutKind::Immediate);
    assert_eq!(delay, Duration::ZERO);
    h.fire(immediate);
    let create = h.sent();
    assert!(matches!(create[0].kind, RequestKind::Create { .. }));
    assert_eq!(h.core.connection_status(), ConnectionStatus::Connecting);
}
