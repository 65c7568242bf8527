//! Service events.
//!
//! Event kinds are a closed enum; the `"<service> <event>"` string clients
//! see is only built when the event is turned into a frame.

use crate::connection::ConnectionId;
use herald_protocol::Frame;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors raised at the event source boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// A required argument was missing or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// The kind of a service event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Updated,
    Patched,
    Removed,
    /// Any other event a service emits, e.g. `log`.
    Custom(String),
}

impl EventKind {
    /// Parse an event name, mapping the standard names to their variants.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidArgument`] for an empty name or one
    /// containing whitespace.
    pub fn parse(name: &str) -> Result<Self, EventError> {
        if name.is_empty() {
            return Err(EventError::InvalidArgument("event name cannot be empty"));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(EventError::InvalidArgument(
                "event name cannot contain whitespace",
            ));
        }
        Ok(match name {
            "created" => EventKind::Created,
            "updated" => EventKind::Updated,
            "patched" => EventKind::Patched,
            "removed" => EventKind::Removed,
            other => EventKind::Custom(other.to_string()),
        })
    }

    /// The event name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Patched => "patched",
            EventKind::Removed => "removed",
            EventKind::Custom(name) => name,
        }
    }

    /// Whether this is one of the four standard mutation events.
    #[must_use]
    pub fn is_standard(&self) -> bool {
        !matches!(self, EventKind::Custom(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ambient data about the call that produced an event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventContext {
    /// Connection that issued the mutating request, if it came over one.
    pub origin: Option<ConnectionId>,
    /// Request parameters.
    pub params: Map<String, Value>,
    /// Identifier of the affected record.
    pub id: Option<Value>,
    /// Payload to broadcast instead of the raw result.
    pub dispatch: Option<Value>,
}

impl EventContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the originating connection.
    #[must_use]
    pub fn with_origin(mut self, origin: ConnectionId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Add a request parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Broadcast `payload` instead of the event result.
    #[must_use]
    pub fn with_dispatch(mut self, payload: Value) -> Self {
        self.dispatch = Some(payload);
        self
    }

    /// Get a request parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// An event emitted by a service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEvent {
    /// Name of the emitting service.
    pub service: String,
    /// What happened.
    pub kind: EventKind,
    /// The post-mutation result.
    pub payload: Value,
    /// Context of the call.
    pub context: EventContext,
}

impl ServiceEvent {
    /// Create an event.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        kind: EventKind,
        payload: Value,
        context: EventContext,
    ) -> Self {
        Self {
            service: service.into(),
            kind,
            payload,
            context,
        }
    }

    /// The wire event name, `"<service> <event>"`.
    #[must_use]
    pub fn event_name(&self) -> String {
        format!("{} {}", self.service, self.kind)
    }

    /// The payload broadcast by default: the context's dispatch override if
    /// set, otherwise the event payload.
    #[must_use]
    pub fn broadcast_payload(&self) -> &Value {
        self.context.dispatch.as_ref().unwrap_or(&self.payload)
    }

    /// Look up a string field of the payload.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Build the frame for this event carrying `payload`.
    #[must_use]
    pub fn to_frame(&self, payload: Value) -> Frame {
        Frame::event(self.event_name(), payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_standard_names() {
        assert_eq!(EventKind::parse("created"), Ok(EventKind::Created));
        assert_eq!(EventKind::parse("removed"), Ok(EventKind::Removed));
        assert_eq!(
            EventKind::parse("log"),
            Ok(EventKind::Custom("log".to_string()))
        );
        assert!(EventKind::parse("patched").unwrap().is_standard());
        assert!(!EventKind::parse("log").unwrap().is_standard());
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        assert!(matches!(
            EventKind::parse(""),
            Err(EventError::InvalidArgument(_))
        ));
        assert!(matches!(
            EventKind::parse("two words"),
            Err(EventError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_event_name() {
        let event = ServiceEvent::new(
            "messages",
            EventKind::Created,
            json!({}),
            EventContext::new(),
        );
        assert_eq!(event.event_name(), "messages created");

        let custom = ServiceEvent::new(
            "messages",
            EventKind::Custom("log".into()),
            json!({}),
            EventContext::new(),
        );
        assert_eq!(custom.event_name(), "messages log");
    }

    #[test]
    fn test_broadcast_payload_prefers_dispatch() {
        let mut event = ServiceEvent::new(
            "users",
            EventKind::Created,
            json!({"email": "a@b.c", "password": "hash"}),
            EventContext::new(),
        );
        assert_eq!(event.broadcast_payload()["password"], json!("hash"));

        event.context = EventContext::new().with_dispatch(json!({"email": "a@b.c"}));
        assert_eq!(event.broadcast_payload(), &json!({"email": "a@b.c"}));
    }

    #[test]
    fn test_context_builders() {
        let ctx = EventContext::new()
            .with_origin("conn_1".into())
            .with_param("provider", json!("socket"));
        assert_eq!(ctx.origin, Some(ConnectionId::from("conn_1")));
        assert_eq!(ctx.param("provider"), Some(&json!("socket")));
    }

    #[test]
    fn test_to_frame() {
        let event = ServiceEvent::new(
            "messages",
            EventKind::Patched,
            json!({"id": 1}),
            EventContext::new(),
        );
        let frame = event.to_frame(event.payload.clone());
        assert_eq!(frame.event_name(), Some("messages patched"));
        assert_eq!(event.payload_str("missing"), None);
    }
}
