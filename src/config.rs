//! Client configuration.

use std::time::Duration;

use snafu::prelude::*;

use crate::{error, ws::Backoff, Endpoint, Result};

static URL_VAR: &str = "MINERLINK_URL";
static HOST_VAR: &str = "MINERLINK_HOST";
static PORT_VAR: &str = "MINERLINK_PORT";
static SECURE_VAR: &str = "MINERLINK_SECURE";

/// Interval between two heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before `force_reconnect` opens the new connection.
pub const FORCE_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Time limit of a single connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// backend websocket endpoint
    pub endpoint: Endpoint,
    /// ping interval while connected
    pub heartbeat_interval: Duration,
    /// reconnect delay policy
    pub backoff: Backoff,
    /// delay before reconnect when forced
    pub force_reconnect_delay: Duration,
    /// time limit of a single connect attempt
    pub connect_timeout: Duration,
    /// send the last known subscription again after every successful connect
    pub resubscribe_on_connect: bool,
}

impl Config {
    /// Config with default timings for given endpoint
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            backoff: Backoff::default(),
            force_reconnect_delay: FORCE_RECONNECT_DELAY,
            connect_timeout: CONNECT_TIMEOUT,
            resubscribe_on_connect: true,
        }
    }

    /// Read endpoint from environment variables.
    ///
    /// `MINERLINK_URL` takes a full `ws://` or `wss://` url. Without it the endpoint is
    /// built from `MINERLINK_HOST` (default `localhost`), `MINERLINK_PORT` (default 8000)
    /// and `MINERLINK_SECURE` (`1`/`true` for `wss`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], with a custom variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(URL_VAR) {
            let endpoint = url
                .parse::<Endpoint>()
                .with_context(|_| error::InvalidEndpoint { url: &url })?;
            return Ok(Self::new(endpoint));
        }

        let host = lookup(HOST_VAR).unwrap_or_else(|| "localhost".to_string());

        let secure = match lookup(SECURE_VAR) {
            Some(value) => parse_flag(SECURE_VAR, &value)?,
            None => false,
        };

        let mut endpoint = Endpoint::for_page(host, secure);

        if let Some(port) = lookup(PORT_VAR) {
            endpoint.port = port
                .parse::<u16>()
                .with_context(|_| error::InvalidPort { value: &port })?;
        }

        log::debug!("Endpoint from environment: {}", endpoint);

        Ok(Self::new(endpoint))
    }

    /// Check timings are usable, [`Client::start`](crate::Client::start) refuses a config
    /// failing this.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.heartbeat_interval.is_zero(),
            error::InvalidConfig {
                field: "heartbeat_interval",
                reason: "must be non-zero",
            }
        );

        ensure!(
            !self.connect_timeout.is_zero(),
            error::InvalidConfig {
                field: "connect_timeout",
                reason: "must be non-zero",
            }
        );

        ensure!(
            self.backoff.factor.is_finite() && self.backoff.factor >= 1.0,
            error::InvalidConfig {
                field: "backoff.factor",
                reason: format!("must be a finite number >= 1, got {}", self.backoff.factor),
            }
        );

        ensure!(
            self.backoff.max_delay >= self.backoff.base,
            error::InvalidConfig {
                field: "backoff.max_delay",
                reason: "must not be less than backoff.base",
            }
        );

        Ok(())
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => error::InvalidFlag { name, value }.fail(),
    }
}
