use std::{fmt::Display, time::Duration};

use serde::Serialize;

use super::{
    backoff::Backoff,
    subscription::{SubscriptionSet, Topic},
};
use crate::{
    ws::{
        message::Outbound,
        transport::{GOING_AWAY, NORMAL_CLOSURE},
    },
    Config,
};

static TRANSPORT_ERROR_MESSAGE: &str = "websocket connection error";

/// Connection lifecycle state as seen by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// no connection and none wanted
    Disconnected,
    /// transport being opened
    Connecting,
    /// transport open
    Connected,
    /// waiting to retry after a drop
    Reconnecting,
    /// last transport failed, see the error message
    Error,
}

impl ConnectionState {
    /// lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// lifecycle state
    pub state: ConnectionState,
    /// last failure for human read, cleared on connect
    pub error: Option<String>,
    /// reconnect attempts since last successful connect
    pub reconnect_attempts: u32,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            error: None,
            reconnect_attempts: 0,
        }
    }
}

impl ConnectionStatus {
    /// transport is open
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// transport is being opened
    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }
}

/// Hosting application lifecycle signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// the view became visible again
    Visible,
    /// the window gained focus
    Focused,
    /// the application is going away
    Unload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Open,
    Waiting { cooldown: bool },
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Connect,
    Disconnect,
    ForceReconnect,
    UpdateSubscriptions(Vec<(Topic, bool)>),
    Send(Outbound),
    Lifecycle(Lifecycle),
    Opened,
    ConnectFailed { fatal: bool, message: String },
    TransportError(String),
    Closed { code: u16, reason: String },
    RetryDue,
    HeartbeatDue,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    Open,
    Close(u16),
    Send(Outbound),
    ScheduleRetry(Duration),
    CancelRetry,
    StartHeartbeat,
    StopHeartbeat,
}

/// Connection state machine, free of IO.
///
/// Every input is an [Event], the returned [Action]s are carried out by the worker
/// in order. Manual disconnects drop the transport before its close can be seen,
/// so a close event always means an unexpected drop.
#[derive(Debug)]
pub(crate) struct Machine {
    phase: Phase,
    faulted: bool,
    error: Option<String>,
    attempts: u32,
    subscriptions: SubscriptionSet,
    backoff: Backoff,
    force_reconnect_delay: Duration,
    resubscribe: bool,
}

impl Machine {
    pub fn new(config: &Config) -> Self {
        Self {
            phase: Phase::Idle,
            faulted: false,
            error: None,
            attempts: 0,
            subscriptions: SubscriptionSet::default(),
            backoff: config.backoff.clone(),
            force_reconnect_delay: config.force_reconnect_delay,
            resubscribe: config.resubscribe_on_connect,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.phase {
            Phase::Idle => ConnectionState::Disconnected,
            Phase::Connecting | Phase::Open if self.faulted => ConnectionState::Error,
            Phase::Connecting => ConnectionState::Connecting,
            Phase::Open => ConnectionState::Connected,
            Phase::Waiting { .. } => ConnectionState::Reconnecting,
            Phase::Failed => ConnectionState::Error,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state(),
            error: self.error.clone(),
            reconnect_attempts: self.attempts,
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        let mut actions = Vec::new();

        match (self.phase, event) {
            (Phase::Connecting | Phase::Open, Event::Connect) => {
                log::debug!("Connect ignored, already {}", self.state());
            }
            (Phase::Waiting { .. }, Event::Connect) => {
                actions.push(Action::CancelRetry);
                self.open(&mut actions);
            }
            (Phase::Idle | Phase::Failed, Event::Connect) => self.open(&mut actions),

            (_, Event::Disconnect) => self.teardown(NORMAL_CLOSURE, &mut actions),

            (_, Event::ForceReconnect) => {
                self.teardown(NORMAL_CLOSURE, &mut actions);
                self.attempts = 0;
                self.phase = Phase::Waiting { cooldown: false };
                actions.push(Action::ScheduleRetry(self.force_reconnect_delay));
            }

            (phase, Event::UpdateSubscriptions(patch)) => {
                self.subscriptions.merge(patch);
                if phase == Phase::Open {
                    actions.push(Action::Send(self.subscribe_message()));
                } else {
                    log::warn!("Subscribe not sent, connection is {}", self.state());
                }
            }

            (Phase::Open, Event::Send(message)) => actions.push(Action::Send(message)),
            (_, Event::Send(message)) => {
                log::warn!(
                    "Drop {} message, connection is {}",
                    message.type_name(),
                    self.state()
                );
            }

            (
                Phase::Idle | Phase::Failed,
                Event::Lifecycle(Lifecycle::Visible | Lifecycle::Focused),
            ) => {
                log::debug!("Application regained attention while {}, connect", self.state());
                self.open(&mut actions);
            }
            (_, Event::Lifecycle(Lifecycle::Unload)) => {
                self.teardown(GOING_AWAY, &mut actions);
            }

            (Phase::Connecting, Event::Opened) => {
                log::info!("Connected");
                self.phase = Phase::Open;
                self.attempts = 0;
                self.faulted = false;
                self.error = None;
                actions.push(Action::CancelRetry);
                actions.push(Action::StartHeartbeat);
                if self.resubscribe && !self.subscriptions.is_empty() {
                    actions.push(Action::Send(self.subscribe_message()));
                }
            }

            (Phase::Connecting, Event::ConnectFailed { fatal: true, message }) => {
                log::error!("Connection can't be constructed: {}", message);
                self.phase = Phase::Failed;
                self.faulted = false;
                self.error = Some(message);
            }
            (Phase::Connecting, Event::ConnectFailed { fatal: false, message }) => {
                log::warn!("Connect failed: {}", message);
                self.error = Some(message);
                self.dropped(false, &mut actions);
            }

            (Phase::Connecting | Phase::Open, Event::TransportError(detail)) => {
                log::warn!("Transport error: {}", detail);
                self.faulted = true;
                self.error = Some(TRANSPORT_ERROR_MESSAGE.to_string());
            }

            (phase @ (Phase::Connecting | Phase::Open), Event::Closed { code, reason }) => {
                log::warn!("Connection closed, code {} {}", code, reason);
                if !self.faulted {
                    self.error = Some(if reason.is_empty() {
                        format!("connection closed with code {}", code)
                    } else {
                        format!("connection closed with code {}: {}", code, reason)
                    });
                }
                self.dropped(phase == Phase::Open, &mut actions);
            }

            (Phase::Waiting { cooldown }, Event::RetryDue) => {
                if cooldown {
                    log::info!("Cooldown over, start reconnect from scratch");
                }
                self.open(&mut actions);
            }

            (Phase::Open, Event::HeartbeatDue) => actions.push(Action::Send(Outbound::ping())),

            (phase, event) => log::trace!("Ignore {:?} in {:?}", event, phase),
        }

        actions
    }

    fn open(&mut self, actions: &mut Vec<Action>) {
        self.phase = Phase::Connecting;
        self.faulted = false;
        actions.push(Action::Open);
    }

    fn teardown(&mut self, code: u16, actions: &mut Vec<Action>) {
        actions.push(Action::StopHeartbeat);
        actions.push(Action::CancelRetry);
        if matches!(self.phase, Phase::Connecting | Phase::Open) {
            actions.push(Action::Close(code));
        }
        self.phase = Phase::Idle;
        self.faulted = false;
    }

    fn dropped(&mut self, was_open: bool, actions: &mut Vec<Action>) {
        actions.push(Action::StopHeartbeat);
        self.faulted = false;

        if was_open {
            self.attempts = 0;
        }

        let retry = self.backoff.next(&mut self.attempts);
        log::info!(
            "Reconnect in {:?}{}",
            retry.delay,
            if retry.cooldown { " (cooldown)" } else { "" }
        );

        self.phase = Phase::Waiting {
            cooldown: retry.cooldown,
        };
        actions.push(Action::ScheduleRetry(retry.delay));
    }

    fn subscribe_message(&self) -> Outbound {
        Outbound::Subscribe {
            topics: self.subscriptions.enabled(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Endpoint;

    fn machine() -> Machine {
        Machine::new(&Config::new(Endpoint::for_page("localhost", false)))
    }

    fn connected() -> Machine {
        let mut m = machine();
        m.handle(Event::Connect);
        m.handle(Event::Opened);
        m
    }

    fn refused() -> Event {
        Event::ConnectFailed {
            fatal: false,
            message: "connection refused".to_string(),
        }
    }

    fn dropped() -> Event {
        Event::Closed {
            code: 1006,
            reason: String::new(),
        }
    }

    fn scheduled(actions: &[Action]) -> Option<Duration> {
        actions.iter().find_map(|action| match action {
            Action::ScheduleRetry(delay) => Some(*delay),
            _ => None,
        })
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut m = machine();

        assert_eq!(m.handle(Event::Connect), vec![Action::Open]);
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(m.handle(Event::Connect).is_empty());

        assert_eq!(
            m.handle(Event::Opened),
            vec![Action::CancelRetry, Action::StartHeartbeat]
        );
        assert_eq!(m.state(), ConnectionState::Connected);
        assert!(m.handle(Event::Connect).is_empty());
    }

    #[test]
    fn test_disconnect_suppresses_reconnect() {
        let mut m = connected();

        let actions = m.handle(Event::Disconnect);
        assert_eq!(
            actions,
            vec![
                Action::StopHeartbeat,
                Action::CancelRetry,
                Action::Close(NORMAL_CLOSURE)
            ]
        );
        assert_eq!(m.state(), ConnectionState::Disconnected);

        assert!(m.handle(Event::RetryDue).is_empty());
        assert!(m.handle(Event::HeartbeatDue).is_empty());
        assert!(m.handle(dropped()).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);

        // idempotent
        assert_eq!(
            m.handle(Event::Disconnect),
            vec![Action::StopHeartbeat, Action::CancelRetry]
        );
    }

    #[test]
    fn test_disconnect_while_waiting_cancels_retry() {
        let mut m = connected();
        m.handle(dropped());
        assert_eq!(m.state(), ConnectionState::Reconnecting);

        let actions = m.handle(Event::Disconnect);
        assert!(actions.contains(&Action::CancelRetry));
        assert!(!actions.iter().any(|a| matches!(a, Action::Close(_))));
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_drop_of_open_connection_resets_attempts() {
        let mut m = connected();
        assert_eq!(m.status().reconnect_attempts, 0);

        let actions = m.handle(dropped());
        assert_eq!(actions, vec![Action::StopHeartbeat, Action::ScheduleRetry(ms(25))]);
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(m.status().error.unwrap().contains("1006"));

        assert_eq!(m.handle(Event::RetryDue), vec![Action::Open]);
        assert_eq!(m.state(), ConnectionState::Connecting);

        m.handle(Event::Opened);
        let status = m.status();
        assert!(status.is_connected());
        assert_eq!(status.reconnect_attempts, 0);
        assert_eq!(status.error, None);
    }

    #[test]
    fn test_failed_attempts_back_off_then_cool_down() {
        let mut m = machine();
        m.handle(Event::Connect);

        let mut delays = Vec::new();
        for _ in 0..6 {
            delays.push(scheduled(&m.handle(refused())).unwrap());
            assert_eq!(m.state(), ConnectionState::Reconnecting);
            assert_eq!(m.handle(Event::RetryDue), vec![Action::Open]);
        }

        assert_eq!(
            delays,
            vec![ms(25), ms(50), ms(100), ms(1000), ms(1500), ms(10_000)]
        );
        assert_eq!(m.status().reconnect_attempts, 0);

        // sequence starts over after the cooldown
        assert_eq!(scheduled(&m.handle(refused())), Some(ms(25)));

        m.handle(Event::RetryDue);
        m.handle(Event::Opened);
        assert_eq!(m.status().reconnect_attempts, 0);
        assert_eq!(m.handle(Event::HeartbeatDue).len(), 1);
    }

    #[test]
    fn test_transport_error_then_close() {
        let mut m = connected();

        assert!(m
            .handle(Event::TransportError("reset by peer".to_string()))
            .is_empty());
        let status = m.status();
        assert_eq!(status.state, ConnectionState::Error);
        assert_eq!(status.error.as_deref(), Some(TRANSPORT_ERROR_MESSAGE));

        let actions = m.handle(dropped());
        assert_eq!(scheduled(&actions), Some(ms(25)));
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert_eq!(m.status().error.as_deref(), Some(TRANSPORT_ERROR_MESSAGE));
    }

    #[test]
    fn test_construction_failure_is_terminal_until_attention() {
        let mut m = machine();
        m.handle(Event::Connect);

        let actions = m.handle(Event::ConnectFailed {
            fatal: true,
            message: "invalid endpoint".to_string(),
        });
        assert!(actions.is_empty());
        assert_eq!(m.state(), ConnectionState::Error);
        assert_eq!(m.status().error.as_deref(), Some("invalid endpoint"));

        assert!(m.handle(Event::RetryDue).is_empty());

        assert_eq!(
            m.handle(Event::Lifecycle(Lifecycle::Focused)),
            vec![Action::Open]
        );
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_lifecycle_reconnects_only_when_disconnected() {
        let mut m = connected();
        assert!(m.handle(Event::Lifecycle(Lifecycle::Visible)).is_empty());

        m.handle(Event::Disconnect);
        assert_eq!(
            m.handle(Event::Lifecycle(Lifecycle::Visible)),
            vec![Action::Open]
        );
    }

    #[test]
    fn test_unload_closes_going_away() {
        let mut m = connected();

        let actions = m.handle(Event::Lifecycle(Lifecycle::Unload));
        assert!(actions.contains(&Action::Close(GOING_AWAY)));
        assert!(actions.contains(&Action::StopHeartbeat));
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_force_reconnect() {
        let mut m = machine();
        m.handle(Event::Connect);
        m.handle(refused());
        m.handle(Event::RetryDue);
        m.handle(refused());
        assert_eq!(m.status().reconnect_attempts, 2);

        m.handle(Event::RetryDue);
        m.handle(Event::Opened);

        let actions = m.handle(Event::ForceReconnect);
        assert!(actions.contains(&Action::Close(NORMAL_CLOSURE)));
        assert_eq!(scheduled(&actions), Some(ms(100)));
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert_eq!(m.status().reconnect_attempts, 0);

        assert_eq!(m.handle(Event::RetryDue), vec![Action::Open]);
    }

    #[test]
    fn test_connect_while_waiting_skips_delay() {
        let mut m = connected();
        m.handle(dropped());

        assert_eq!(
            m.handle(Event::Connect),
            vec![Action::CancelRetry, Action::Open]
        );
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_subscriptions_sent_when_open() {
        let mut m = connected();

        let actions = m.handle(Event::UpdateSubscriptions(vec![(Topic::Miners, true)]));
        assert_eq!(
            actions,
            vec![Action::Send(Outbound::Subscribe {
                topics: vec![Topic::Miners]
            })]
        );

        let actions = m.handle(Event::UpdateSubscriptions(vec![
            (Topic::Alerts, true),
            (Topic::System, false),
        ]));
        assert_eq!(
            actions,
            vec![Action::Send(Outbound::Subscribe {
                topics: vec![Topic::Miners, Topic::Alerts]
            })]
        );
    }

    #[test]
    fn test_subscriptions_replayed_on_connect() {
        let mut m = machine();

        assert!(m
            .handle(Event::UpdateSubscriptions(vec![
                (Topic::Alerts, true),
                (Topic::Miners, false)
            ]))
            .is_empty());

        m.handle(Event::Connect);
        let actions = m.handle(Event::Opened);
        assert_eq!(
            actions.last(),
            Some(&Action::Send(Outbound::Subscribe {
                topics: vec![Topic::Alerts]
            }))
        );
    }

    #[test]
    fn test_subscriptions_not_replayed_when_disabled() {
        let mut config = Config::new(Endpoint::for_page("localhost", false));
        config.resubscribe_on_connect = false;
        let mut m = Machine::new(&config);

        m.handle(Event::UpdateSubscriptions(vec![(Topic::Alerts, true)]));
        m.handle(Event::Connect);
        assert_eq!(
            m.handle(Event::Opened),
            vec![Action::CancelRetry, Action::StartHeartbeat]
        );
    }

    #[test]
    fn test_send_only_when_open() {
        let mut m = machine();
        let message = Outbound::Custom(serde_json::json!({"type": "get_status"}));

        assert!(m.handle(Event::Send(message.clone())).is_empty());

        m.handle(Event::Connect);
        m.handle(Event::Opened);
        assert_eq!(
            m.handle(Event::Send(message.clone())),
            vec![Action::Send(message)]
        );
    }

    #[test]
    fn test_heartbeat_only_when_open() {
        let mut m = machine();
        assert!(m.handle(Event::HeartbeatDue).is_empty());

        let mut m = connected();
        assert!(matches!(
            m.handle(Event::HeartbeatDue).as_slice(),
            [Action::Send(Outbound::Ping { .. })]
        ));
    }
}
