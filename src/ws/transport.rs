//! Transport between the connection worker and the network.

use std::{borrow::Cow, fmt::Debug, time::Duration};

use futures_util::{SinkExt, StreamExt};
use snafu::prelude::*;
use tokio::time;
use tokio_tungstenite as websocket;
use websocket::tungstenite::{
    self,
    protocol::{frame::coding::CloseCode, CloseFrame},
};

pub(crate) type WebsocketClient =
    websocket::WebSocketStream<websocket::MaybeTlsStream<tokio::net::TcpStream>>;

/// Close code of a normal, requested closure
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code used when the client goes away
pub const GOING_AWAY: u16 = 1001;
/// Close code peer sent no status
pub const NO_STATUS: u16 = 1005;
/// Close code reported when the connection dropped without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Time limit of a close handshake, a peer that stops reading is given up on after it.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Frame received from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// text data
    Text(String),
    /// peer closed the connection
    Close {
        /// close code
        code: u16,
        /// close reason
        reason: String,
    },
}

/// Error when read/write a transport
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum TransportError {
    /// underlying websocket stream broken
    #[snafu(display("underlying websocket stream broken: {source}"))]
    Websocket {
        /// source error
        source: tungstenite::Error,
    },

    /// transport is already closed
    #[snafu(display("transport closed"))]
    Closed,
}

/// Error when open a transport
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(connect_error), context(suffix(false)))]
pub enum ConnectError {
    /// endpoint can't be turned into an url
    #[snafu(display("invalid endpoint: {source}"))]
    InvalidEndpoint {
        /// source error
        source: crate::ParseEndpointError,
    },

    /// transport can't be constructed for this url
    #[snafu(display("invalid websocket request for {url}: {source}"))]
    InvalidRequest {
        /// target url
        url: String,
        /// source error
        source: tungstenite::Error,
    },

    /// network level failure
    #[snafu(display("connect {url} failed: {source}"))]
    Handshake {
        /// target url
        url: String,
        /// source error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// open not finished in time
    #[snafu(display("connect {url} timeout after {limit:?}"))]
    Timeout {
        /// target url
        url: String,
        /// time limit
        limit: Duration,
    },
}

impl ConnectError {
    /// Check if retrying can not help, the transport itself can't be constructed
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidEndpoint { .. } | Self::InvalidRequest { .. } => true,
            Self::Handshake { .. } | Self::Timeout { .. } => false,
        }
    }
}

/// An open full-duplex connection
#[async_trait::async_trait]
pub trait Transport: Send + Debug {
    /// send a text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// wait next data or close frame, `None` when the connection is gone.
    ///
    /// must be cancel safe, the worker polls it inside `select!`.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// close with given code, errors are ignored
    async fn close(&mut self, code: u16);
}

/// Opens transports
#[async_trait::async_trait]
pub trait Connector: Send + Sync + Debug {
    /// open a transport to url
    async fn connect(&self, url: url::Url) -> Result<Box<dyn Transport>, ConnectError>;
}

/// [Connector] backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct WebsocketConnector;

#[async_trait::async_trait]
impl Connector for WebsocketConnector {
    async fn connect(&self, url: url::Url) -> Result<Box<dyn Transport>, ConnectError> {
        log::debug!("Connecting websocket: {}", url);

        match websocket::connect_async(url.as_str()).await {
            Ok((ws, _)) => Ok(Box::new(WebsocketTransport { ws })),
            Err(source @ tungstenite::Error::Url(_)) => Err(ConnectError::InvalidRequest {
                url: url.to_string(),
                source,
            }),
            Err(source) => Err(ConnectError::Handshake {
                url: url.to_string(),
                source: Box::new(source),
            }),
        }
    }
}

/// [Transport] backed by tokio-tungstenite
#[derive(Debug)]
pub struct WebsocketTransport {
    ws: WebsocketClient,
}

#[async_trait::async_trait]
impl Transport for WebsocketTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.ws
            .send(tungstenite::Message::Text(text))
            .await
            .context(error::Websocket)
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let message = match self.ws.next().await? {
                Ok(message) => message,
                Err(source) => return Some(Err(TransportError::Websocket { source })),
            };

            match message {
                tungstenite::Message::Text(text) => return Some(Ok(Frame::Text(text))),
                tungstenite::Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(_) => log::warn!("Received a non-utf8 binary frame, ignored"),
                },
                tungstenite::Message::Close(frame) => {
                    // tungstenite queued the close reply, it's written on flush
                    if let Ok(Err(err)) = time::timeout(CLOSE_TIMEOUT, self.ws.flush()).await {
                        log::debug!("Send close reply failed, ignored: {}", err);
                    }

                    let frame = match frame {
                        Some(frame) => Frame::Close {
                            code: frame.code.into(),
                            reason: frame.reason.into_owned(),
                        },
                        None => Frame::Close {
                            code: NO_STATUS,
                            reason: String::new(),
                        },
                    };
                    return Some(Ok(frame));
                }
                // protocol level ping/pong is answered by tungstenite
                _ => log::trace!("Received control frame"),
            }
        }
    }

    async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Borrowed(""),
        };

        if let Err(err) = self.ws.close(Some(frame)).await {
            log::debug!("Close websocket failed, ignored: {}", err);
        }
    }
}
