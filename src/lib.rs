//! # Minerlink
//!
//! Connection client for the solo mining monitor backend.
//!
//! Keeps one websocket to the backend alive while the dashboard wants it: reconnects with
//! backoff after drops, pings every 30 seconds, replays the topic subscription and routes
//! pushed updates to [Sinks].
//!
//! ```no_run
//! use minerlink::{Client, Config, Endpoint, Sinks, Topic};
//!
//! # async fn run() -> minerlink::Result<()> {
//! let config = Config::new(Endpoint::for_page("192.168.1.20", false));
//! let sinks = Sinks::new().miners(|data: &serde_json::Value| println!("{}", data));
//!
//! let client = Client::start(config, sinks)?;
//! client.connect();
//! client.update_subscriptions([(Topic::Miners, true)]);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod sink;
pub mod ws;

mod endpoint;
mod error;

pub use config::Config;
pub use endpoint::{Endpoint, ParseEndpointError};
pub use error::{Error, Result};
pub use sink::{Sinks, UpdateSink};
pub use ws::{Backoff, Client, ConnectionState, ConnectionStatus, Lifecycle, Topic};
