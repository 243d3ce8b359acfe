mod backoff;
#[cfg(test)]
mod mock;
mod state;
mod subscription;
mod worker;

pub use backoff::Backoff;
pub use state::{ConnectionState, ConnectionStatus, Lifecycle};
pub use subscription::{ParseTopicError, Topic};

use std::sync::Arc;

use serde_json::Value;
use snafu::prelude::*;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use super::{
    message::Outbound,
    transport::{Connector, WebsocketConnector},
};
use crate::{error, Config, Result, Sinks};
use worker::{Command, Worker};

/// Monitor backend connection client.
///
/// All connection work happens in a background task, methods here only queue a
/// command and return at once. Observe the outcome through [`Client::status`] or
/// [`Client::watch_status`].
///
/// Dropping the client has the same effect as [`Lifecycle::Unload`].
#[derive(Debug)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl Client {
    /// Start the connection worker using websocket transport, must be called inside a
    /// tokio runtime.
    ///
    /// Nothing is connected until [`Client::connect`]. Fails when the config does not pass
    /// [`Config::validate`].
    pub fn start(config: Config, sinks: Sinks) -> Result<Self> {
        Self::start_with_connector(config, sinks, WebsocketConnector)
    }

    /// Same as [`Client::start`], with a custom transport
    pub fn start_with_connector<C>(config: Config, sinks: Sinks, connector: C) -> Result<Self>
    where
        C: Connector + 'static,
    {
        config.validate()?;

        let (commands, rx) = mpsc::unbounded_channel();
        let (tx, status) = watch::channel(ConnectionStatus::default());

        log::debug!("Start connection worker for {}", config.endpoint);

        let worker = Worker::new(config, sinks, Arc::new(connector), rx, tx);
        let task = tokio::spawn(worker.run());

        Ok(Self {
            commands,
            status,
            task,
        })
    }

    /// Open the connection, no-op when connecting or connected
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the connection with code 1000 and stop any pending reconnect
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Drop current connection and reconnect shortly after, resetting the attempt counter
    pub fn force_reconnect(&self) {
        self.command(Command::ForceReconnect);
    }

    /// Merge topic flags into the desired subscription and send the full enabled set.
    ///
    /// When not connected the set is only remembered, it's sent again after the next
    /// successful connect.
    pub fn update_subscriptions<I>(&self, patch: I)
    where
        I: IntoIterator<Item = (Topic, bool)>,
    {
        self.command(Command::UpdateSubscriptions(patch.into_iter().collect()));
    }

    /// Send an arbitrary message, dropped with a warning when not connected
    pub fn send_message(&self, message: Value) {
        self.command(Command::Send(Outbound::Custom(message)));
    }

    /// Forward a lifecycle signal of the hosting application
    pub fn notify(&self, lifecycle: Lifecycle) {
        self.command(Command::Lifecycle(lifecycle));
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Close the connection with code 1001 and wait the worker to stop
    pub async fn shutdown(self) -> Result<()> {
        self.command(Command::Lifecycle(Lifecycle::Unload));
        self.task.await.context(error::WorkerStopped)
    }

    fn command(&self, command: Command) {
        if let Err(err) = self.commands.send(command) {
            log::warn!("Connection worker gone, drop command {:?}", err.0);
        }
    }
}
