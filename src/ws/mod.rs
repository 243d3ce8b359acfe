//! Monitor backend websocket client implement

mod client;
pub mod message;
pub mod transport;

pub use client::{
    Backoff, Client, ConnectionState, ConnectionStatus, Lifecycle, ParseTopicError, Topic,
};
pub use message::{Inbound, Outbound, ParseMessageError, Payload};
pub use transport::{
    ConnectError, Connector, Frame, Transport, TransportError, WebsocketConnector,
    WebsocketTransport,
};
