use std::sync::{Arc, Mutex};

use futures_util::future;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::ws::transport::{ConnectError, Connector, Frame, Transport, TransportError};

#[derive(Debug)]
struct MockState {
    refuse: u32,
    hang: u32,
    attempts: u32,
    peers: mpsc::UnboundedSender<Peer>,
}

/// In-memory connector, every accepted connect hands the server side out as a [Peer].
#[derive(Debug, Clone)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Peer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let state = MockState {
            refuse: 0,
            hang: 0,
            attempts: 0,
            peers,
        };
        (
            Self {
                state: Arc::new(Mutex::new(state)),
            },
            rx,
        )
    }

    pub fn refuse_next(&self, n: u32) {
        self.state.lock().unwrap().refuse = n;
    }

    /// next `n` connects never finish
    pub fn hang_next(&self, n: u32) {
        self.state.lock().unwrap().hang = n;
    }

    pub fn attempts(&self) -> u32 {
        self.state.lock().unwrap().attempts
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: url::Url) -> Result<Box<dyn Transport>, ConnectError> {
        let transport = {
            let mut state = self.state.lock().unwrap();
            state.attempts += 1;

            if state.hang > 0 {
                state.hang -= 1;
                None
            } else if state.refuse > 0 {
                state.refuse -= 1;
                return Err(ConnectError::Handshake {
                    url: url.to_string(),
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    )),
                });
            } else {
                let (frames_tx, frames_rx) = mpsc::unbounded_channel();
                let (sent_tx, sent_rx) = mpsc::unbounded_channel();
                let shared = Arc::new(Mutex::new(PeerState::default()));

                let peer = Peer {
                    frames: frames_tx,
                    sent: sent_rx,
                    shared: Arc::clone(&shared),
                };
                let _ = state.peers.send(peer);

                Some(MockTransport {
                    frames: frames_rx,
                    sent: sent_tx,
                    shared,
                })
            }
        };

        match transport {
            Some(transport) => Ok(Box::new(transport)),
            None => future::pending().await,
        }
    }
}

#[derive(Debug, Default)]
struct PeerState {
    closed: Option<u16>,
    stall_close: bool,
}

#[derive(Debug)]
struct MockTransport {
    frames: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    sent: mpsc::UnboundedSender<String>,
    shared: Arc<Mutex<PeerState>>,
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.send(text).map_err(|_| TransportError::Closed)
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.frames.recv().await
    }

    async fn close(&mut self, code: u16) {
        let stall = {
            let mut shared = self.shared.lock().unwrap();
            shared.closed = Some(code);
            shared.stall_close
        };

        if stall {
            future::pending::<()>().await;
        }
    }
}

/// Server side of a mock connection.
#[derive(Debug)]
pub(crate) struct Peer {
    frames: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    sent: mpsc::UnboundedReceiver<String>,
    shared: Arc<Mutex<PeerState>>,
}

impl Peer {
    pub fn push(&self, value: Value) {
        self.push_text(&value.to_string());
    }

    pub fn push_text(&self, text: &str) {
        let _ = self.frames.send(Ok(Frame::Text(text.to_string())));
    }

    /// send a close frame
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.frames.send(Ok(Frame::Close {
            code,
            reason: reason.to_string(),
        }));
    }

    /// break the stream with a read error
    pub fn fail(&self) {
        let _ = self.frames.send(Err(TransportError::Closed));
    }

    /// drop the connection without a close frame
    pub fn hang_up(self) {}

    /// stop reading, so the client's close handshake never finishes
    pub fn stall_close(&self) {
        self.shared.lock().unwrap().stall_close = true;
    }

    /// messages the client sent since last call
    pub fn sent(&mut self) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(text) = self.sent.try_recv() {
            messages.push(serde_json::from_str(&text).unwrap());
        }
        messages
    }

    pub fn closed_with(&self) -> Option<u16> {
        self.shared.lock().unwrap().closed
    }
}
