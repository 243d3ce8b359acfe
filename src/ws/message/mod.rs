//! Monitor backend websocket message types.

mod types;

pub use types::{
    ConnectionEstablished, ErrorReport, Heartbeat, Payload, SubscriptionUpdate, Unknown,
};

use chrono::{SecondsFormat, Utc};
use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::prelude::*;

use super::Topic;

/// Error when parse text frame as message
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)), module(error), context(suffix(false)))]
pub enum ParseMessageError {
    /// data is invalid json
    #[snafu(display("parse json failed: {source}"))]
    ParseJSONFailed {
        /// text for decode
        json: String,
        /// source error
        source: serde_json::Error,
    },

    /// data json is not an object
    #[snafu(display("parsed message is not object: {json}"))]
    MessageNotObject {
        /// json string
        json: String,
    },

    /// data json has no type field
    #[snafu(display("message has no type field: {json}"))]
    NoMessageType {
        /// json string
        json: String,
    },

    /// data json type field is not string
    #[snafu(display("message has non-string type field: {json}"))]
    MessageTypeNotString {
        /// json string
        json: String,
    },

    /// data json is not valid typed message
    #[snafu(display("parse to {type_name} message failed: {source}"))]
    ParseJSONToTypedMessageFailed {
        /// type name
        type_name: String,
        /// source error
        source: serde_json::Error,
    },
}

static KNOWN_TYPES: &[&str] = &[
    "connection_established",
    "subscription_update",
    "miners_update",
    "alerts_update",
    "system_update",
    "ping",
    "pong",
    "error",
    "validation_error",
    "processing_error",
    "status_response",
    "topics_response",
];

/// Message received from the monitor backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// first message of a connection
    ConnectionEstablished(ConnectionEstablished),
    /// server confirmed a subscribe request
    SubscriptionUpdate(SubscriptionUpdate),
    /// fresh miners snapshot
    MinersUpdate(Payload),
    /// fresh alerts snapshot
    AlertsUpdate(Payload),
    /// fresh system snapshot
    SystemUpdate(Payload),
    /// server heartbeat, must be answered with a pong
    Ping(Heartbeat),
    /// answer of our ping
    Pong(Heartbeat),
    /// generic server error
    Error(ErrorReport),
    /// server rejected a malformed request
    ValidationError(ErrorReport),
    /// server failed to process a request
    ProcessingError(ErrorReport),
    /// answer of a status request
    StatusResponse(Payload),
    /// answer of a topics request
    TopicsResponse(Payload),
    /// any other type
    #[serde(skip)]
    Unknown(Unknown),
}

impl Inbound {
    /// Decode a text frame to a message
    pub fn decode(text: &str) -> Result<Self, ParseMessageError> {
        let value: Value =
            serde_json::from_str(text).context(error::ParseJSONFailed { json: text })?;

        let kind = value
            .as_object()
            .with_context(|| error::MessageNotObject { json: text })?
            .get("type")
            .with_context(|| error::NoMessageType { json: text })?
            .as_str()
            .with_context(|| error::MessageTypeNotString { json: text })?
            .to_string();

        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Ok(Self::Unknown(Unknown { kind, raw: value }));
        }

        serde_json::from_value(value)
            .with_context(|_| error::ParseJSONToTypedMessageFailed { type_name: kind })
    }

    /// get type name
    pub fn type_name(&self) -> &str {
        match self {
            Self::ConnectionEstablished(_) => "connection_established",
            Self::SubscriptionUpdate(_) => "subscription_update",
            Self::MinersUpdate(_) => "miners_update",
            Self::AlertsUpdate(_) => "alerts_update",
            Self::SystemUpdate(_) => "system_update",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Error(_) => "error",
            Self::ValidationError(_) => "validation_error",
            Self::ProcessingError(_) => "processing_error",
            Self::StatusResponse(_) => "status_response",
            Self::TopicsResponse(_) => "topics_response",
            Self::Unknown(unknown) => &unknown.kind,
        }
    }
}

/// Message sent to the monitor backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// replace the topic subscription of this connection
    Subscribe {
        /// enabled topics
        topics: Vec<Topic>,
    },
    /// heartbeat
    Ping {
        /// ISO8601 send time
        timestamp: String,
    },
    /// answer of a server ping
    Pong {
        /// ISO8601 send time
        timestamp: String,
    },
    /// caller supplied message, sent as is
    #[serde(skip)]
    Custom(Value),
}

impl Outbound {
    /// ping stamped with current time
    pub fn ping() -> Self {
        Self::Ping { timestamp: now() }
    }

    /// pong stamped with current time
    pub fn pong() -> Self {
        Self::Pong { timestamp: now() }
    }

    /// encode to text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Custom(value) => serde_json::to_string(value),
            _ => serde_json::to_string(self),
        }
    }

    /// get type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Custom(_) => "custom",
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
