use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures_util::future::{self, BoxFuture};
use snafu::prelude::*;
use tokio::{
    sync::{mpsc, watch},
    time::{self, Instant, Interval, MissedTickBehavior},
};

use super::{
    state::{Action, ConnectionStatus, Event, Lifecycle, Machine},
    subscription::Topic,
};
use crate::{
    ws::{
        message::{Inbound, Outbound},
        transport::{
            connect_error, Connector, Frame, Transport, TransportError, ABNORMAL_CLOSURE,
            CLOSE_TIMEOUT,
        },
        ConnectError,
    },
    Config, Endpoint, Sinks,
};

#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    ForceReconnect,
    UpdateSubscriptions(Vec<(Topic, bool)>),
    Send(Outbound),
    Lifecycle(Lifecycle),
}

impl From<Command> for Event {
    fn from(command: Command) -> Self {
        match command {
            Command::Connect => Event::Connect,
            Command::Disconnect => Event::Disconnect,
            Command::ForceReconnect => Event::ForceReconnect,
            Command::UpdateSubscriptions(patch) => Event::UpdateSubscriptions(patch),
            Command::Send(message) => Event::Send(message),
            Command::Lifecycle(lifecycle) => Event::Lifecycle(lifecycle),
        }
    }
}

type Opening = BoxFuture<'static, Result<Box<dyn Transport>, ConnectError>>;

/// Owns the transport and both timers, runs every input through the [Machine].
pub(crate) struct Worker {
    machine: Machine,
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    heartbeat_interval: Duration,
    sinks: Sinks,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ConnectionStatus>,
    transport: Option<Box<dyn Transport>>,
    opening: Option<Opening>,
    retry_at: Option<Instant>,
    heartbeat: Option<Interval>,
}

impl Worker {
    pub fn new(
        config: Config,
        sinks: Sinks,
        connector: Arc<dyn Connector>,
        commands: mpsc::UnboundedReceiver<Command>,
        status: watch::Sender<ConnectionStatus>,
    ) -> Self {
        Self {
            machine: Machine::new(&config),
            endpoint: config.endpoint,
            connector,
            connect_timeout: config.connect_timeout,
            heartbeat_interval: config.heartbeat_interval,
            sinks,
            commands,
            status,
            transport: None,
            opening: None,
            retry_at: None,
            heartbeat: None,
        }
    }

    pub async fn run(mut self) {
        log::debug!("Connection worker start");

        loop {
            let retry = sleep_until(self.retry_at);

            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    match command {
                        Some(Command::Lifecycle(Lifecycle::Unload)) | None => {
                            log::debug!("Unload requested or client dropped");
                            self.apply(Event::Lifecycle(Lifecycle::Unload)).await;
                            break;
                        }
                        Some(command) => {
                            log::trace!("Received command {:?}", command);
                            self.apply(command.into()).await;
                        }
                    }
                }

                result = opened(&mut self.opening) => {
                    self.opening = None;
                    match result {
                        Ok(transport) => {
                            log::debug!("Transport open");
                            self.transport = Some(transport);
                            self.apply(Event::Opened).await;
                        }
                        Err(err) => {
                            self.apply(Event::ConnectFailed {
                                fatal: err.is_fatal(),
                                message: err.to_string(),
                            })
                            .await;
                        }
                    }
                }

                frame = next_frame(&mut self.transport) => self.on_frame(frame).await,

                _ = tick(&mut self.heartbeat) => self.apply(Event::HeartbeatDue).await,

                _ = retry => {
                    self.retry_at = None;
                    self.apply(Event::RetryDue).await;
                }
            }
        }

        log::debug!("Connection worker stop");
    }

    async fn apply(&mut self, event: Event) {
        let mut events = VecDeque::from([event]);

        while let Some(event) = events.pop_front() {
            for action in self.machine.handle(event) {
                if let Some(next) = self.execute(action).await {
                    events.push_back(next);
                }
            }
        }

        let status = self.machine.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            log::debug!("Connection status {} -> {}", current.state, status.state);
            *current = status;
            true
        });
    }

    async fn execute(&mut self, action: Action) -> Option<Event> {
        log::trace!("Execute {:?}", action);

        match action {
            Action::Open => {
                self.transport = None;

                let url = match self.endpoint.url().context(connect_error::InvalidEndpoint) {
                    Ok(url) => url,
                    Err(err) => {
                        return Some(Event::ConnectFailed {
                            fatal: err.is_fatal(),
                            message: err.to_string(),
                        })
                    }
                };

                log::info!("Connecting {}", url);

                let connector = Arc::clone(&self.connector);
                let limit = self.connect_timeout;
                self.opening = Some(Box::pin(async move {
                    let target = url.to_string();
                    match time::timeout(limit, connector.connect(url)).await {
                        Ok(result) => result,
                        Err(_) => connect_error::Timeout { url: target, limit }.fail(),
                    }
                }));
            }
            Action::Close(code) => {
                if self.opening.take().is_some() {
                    log::debug!("Abort pending connect");
                }
                if let Some(mut transport) = self.transport.take() {
                    log::debug!("Close transport with code {}", code);
                    if time::timeout(CLOSE_TIMEOUT, transport.close(code)).await.is_err() {
                        log::warn!("Close handshake timeout after {:?}, dropped", CLOSE_TIMEOUT);
                    }
                }
            }
            Action::Send(message) => self.send(message).await,
            Action::ScheduleRetry(delay) => self.retry_at = Some(Instant::now() + delay),
            Action::CancelRetry => self.retry_at = None,
            Action::StartHeartbeat => {
                let mut interval = time::interval_at(
                    Instant::now() + self.heartbeat_interval,
                    self.heartbeat_interval,
                );
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(interval);
            }
            Action::StopHeartbeat => self.heartbeat = None,
        }

        None
    }

    async fn send(&mut self, message: Outbound) {
        let name = message.type_name();

        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => {
                log::warn!("Drop {} message, transport is not open", name);
                return;
            }
        };

        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Encode {} message failed: {}", name, err);
                return;
            }
        };

        log::trace!("Send {} message: {}", name, text);

        if let Err(err) = transport.send_text(text).await {
            log::warn!("Send {} message failed: {}", name, err);
        }
    }

    async fn on_frame(&mut self, frame: Option<Result<Frame, TransportError>>) {
        match frame {
            Some(Ok(Frame::Text(text))) => self.on_text(&text).await,
            Some(Ok(Frame::Close { code, reason })) => {
                self.transport = None;
                self.apply(Event::Closed { code, reason }).await;
            }
            Some(Err(err)) => {
                self.transport = None;
                self.apply(Event::TransportError(err.to_string())).await;
                self.apply(Event::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: String::new(),
                })
                .await;
            }
            None => {
                self.transport = None;
                self.apply(Event::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: "stream ended".to_string(),
                })
                .await;
            }
        }
    }

    async fn on_text(&mut self, text: &str) {
        let message = match Inbound::decode(text) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("Ignore unparseable frame: {}", err);
                return;
            }
        };

        log::trace!("Received {} message", message.type_name());

        if let Some(reply) = self.sinks.dispatch(message) {
            self.send(reply).await;
        }
    }
}

async fn opened(opening: &mut Option<Opening>) -> Result<Box<dyn Transport>, ConnectError> {
    match opening {
        Some(fut) => fut.await,
        None => future::pending().await,
    }
}

async fn next_frame(
    transport: &mut Option<Box<dyn Transport>>,
) -> Option<Result<Frame, TransportError>> {
    match transport {
        Some(transport) => transport.next_frame().await,
        None => future::pending().await,
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
