//! Update sinks.

use std::fmt::Debug;

use serde_json::Value;

use crate::ws::{Inbound, Outbound};

/// Sink receives pushed update payloads, usually a store the UI reads from.
pub trait UpdateSink: Send {
    /// callback will be execute for every update, with the raw `data` payload
    fn on_update(&mut self, data: &Value);
}

impl<F> UpdateSink for F
where
    F: FnMut(&Value) + Send,
{
    fn on_update(&mut self, data: &Value) {
        self(data)
    }
}

/// Sinks for each data-bearing message kind, an unset sink only logs.
#[derive(Default)]
pub struct Sinks {
    miners: Option<Box<dyn UpdateSink>>,
    alerts: Option<Box<dyn UpdateSink>>,
    system: Option<Box<dyn UpdateSink>>,
}

impl Debug for Sinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sinks")
            .field("miners", &self.miners.is_some())
            .field("alerts", &self.alerts.is_some())
            .field("system", &self.system.is_some())
            .finish()
    }
}

impl Sinks {
    /// Create with no sink set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set sink for `miners_update`
    pub fn miners<S: UpdateSink + 'static>(mut self, sink: S) -> Self {
        self.miners = Some(Box::new(sink));
        self
    }

    /// Set sink for `alerts_update`
    pub fn alerts<S: UpdateSink + 'static>(mut self, sink: S) -> Self {
        self.alerts = Some(Box::new(sink));
        self
    }

    /// Set sink for `system_update`
    pub fn system<S: UpdateSink + 'static>(mut self, sink: S) -> Self {
        self.system = Some(Box::new(sink));
        self
    }

    /// Route a message, returning the reply it asks for.
    pub(crate) fn dispatch(&mut self, message: Inbound) -> Option<Outbound> {
        match message {
            Inbound::ConnectionEstablished(data) => {
                log::info!(
                    "Connection established, client id {}",
                    data.client_id.as_deref().unwrap_or("<none>")
                );
            }
            Inbound::SubscriptionUpdate(data) => {
                log::debug!("Subscription confirmed: {:?}", data.topics);
            }
            Inbound::MinersUpdate(payload) => forward("miners", &mut self.miners, &payload.data),
            Inbound::AlertsUpdate(payload) => forward("alerts", &mut self.alerts, &payload.data),
            Inbound::SystemUpdate(payload) => forward("system", &mut self.system, &payload.data),
            Inbound::Ping(_) => {
                log::trace!("Received ping, reply pong");
                return Some(Outbound::pong());
            }
            Inbound::Pong(data) => {
                log::trace!("Received pong sent at {:?}", data.timestamp);
            }
            Inbound::Error(report)
            | Inbound::ValidationError(report)
            | Inbound::ProcessingError(report) => {
                log::warn!(
                    "Backend reported error: {} {:?}",
                    report.message.as_deref().unwrap_or("<no message>"),
                    report.details
                );
            }
            Inbound::StatusResponse(payload) => {
                log::debug!("Backend status: {}", payload.data);
            }
            Inbound::TopicsResponse(payload) => {
                log::debug!("Backend topics: {}", payload.data);
            }
            Inbound::Unknown(unknown) => {
                log::debug!("Ignore message with unknown type {}", unknown.kind);
            }
        }

        None
    }
}

fn forward(name: &str, sink: &mut Option<Box<dyn UpdateSink>>, data: &Value) {
    match sink {
        Some(sink) => {
            log::trace!("Forward {} update to sink", name);
            sink.on_update(data);
        }
        None => log::debug!("Received {} update, no sink set", name),
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::ws::Payload;

    #[test]
    fn test_dispatch_forwards_to_matching_sink() {
        let miners = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::clone(&miners);

        let mut sinks =
            Sinks::new().miners(move |data: &Value| received.lock().unwrap().push(data.clone()));

        let reply = sinks.dispatch(Inbound::MinersUpdate(Payload {
            data: json!([{"ip": "10.0.0.7"}]),
        }));
        assert!(reply.is_none());

        let reply = sinks.dispatch(Inbound::AlertsUpdate(Payload { data: json!([]) }));
        assert!(reply.is_none());

        assert_eq!(*miners.lock().unwrap(), vec![json!([{"ip": "10.0.0.7"}])]);
    }

    #[test]
    fn test_dispatch_ping_asks_for_pong() {
        let mut sinks = Sinks::new();

        let reply = sinks.dispatch(Inbound::decode(r#"{"type":"ping"}"#).unwrap());

        assert!(matches!(reply, Some(Outbound::Pong { .. })));
    }

    #[test]
    fn test_dispatch_errors_only_log() {
        let mut sinks = Sinks::new();

        for text in [
            r#"{"type":"error","message":"boom"}"#,
            r#"{"type":"processing_error"}"#,
            r#"{"type":"pong"}"#,
            r#"{"type":"firmware_update"}"#,
        ] {
            assert!(sinks.dispatch(Inbound::decode(text).unwrap()).is_none());
        }
    }

    #[test]
    fn test_sinks_debug_shows_set_sinks() {
        let sinks = Sinks::new().system(|_: &Value| {});
        let s = format!("{:?}", sinks);
        assert!(s.contains("system: true"));
        assert!(s.contains("miners: false"));
    }
}
