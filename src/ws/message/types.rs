use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of messages that carry an opaque `data` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// payload owned by the backend
    #[serde(default)]
    pub data: Value,
}

/// ConnectionEstablished message data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEstablished {
    /// id the backend assigned to this connection
    #[serde(default)]
    pub client_id: Option<String>,
}

/// SubscriptionUpdate message data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    /// topics the backend confirms for this connection
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Ping/Pong message data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// ISO8601 time the peer sent it
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Error, ValidationError and ProcessingError message data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// reason for human read
    #[serde(default, alias = "error")]
    pub message: Option<String>,
    /// extra details, differ for each error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// A message whose type this client does not know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unknown {
    /// value of the type field
    pub kind: String,
    /// the whole message
    pub raw: Value,
}
