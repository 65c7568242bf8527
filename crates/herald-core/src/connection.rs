//! Connections and the sinks they are reached through.
//!
//! A [`Connection`] is created by the registry when the transport layer
//! accepts a client and lives until it is unregistered. Everything else in
//! the core holds `Arc<Connection>` handles.

use async_trait::async_trait;
use dashmap::DashMap;
use herald_protocol::Frame;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Connect-time attributes, e.g. the query parameters of the handshake.
pub type Attributes = HashMap<String, Value>;

/// Counter backing generated connection IDs.
static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Create a connection ID from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    /// Generate a fresh, process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::new(format!("conn_{:x}", n))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Delivery failure reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The underlying transport is gone.
    #[error("Connection closed")]
    Closed,

    /// The send did not complete within the dispatch timeout.
    #[error("Send timed out")]
    Timeout,

    /// Any other transport failure.
    #[error("Send failed: {0}")]
    Failed(String),
}

/// The transport handle the dispatcher pushes frames into.
///
/// Implementations must report failure through the returned `Result`;
/// the dispatcher bounds every call with its own timeout.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver a frame to the client.
    async fn send(&self, frame: Arc<Frame>) -> Result<(), SendError>;

    /// Whether the transport is still able to accept frames.
    fn is_open(&self) -> bool {
        true
    }
}

/// A live client connection.
pub struct Connection {
    id: ConnectionId,
    attributes: DashMap<String, Value>,
    sink: Arc<dyn EventSink>,
    closed: AtomicBool,
    connected_at: u64,
}

impl Connection {
    /// Create a connection. Normally called by the registry.
    #[must_use]
    pub fn new(id: ConnectionId, sink: Arc<dyn EventSink>, attributes: Attributes) -> Self {
        let connected_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            id,
            attributes: attributes.into_iter().collect(),
            sink,
            closed: AtomicBool::new(false),
            connected_at,
        }
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Get a single attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes.get(key).map(|v| v.value().clone())
    }

    /// Get a string attribute.
    #[must_use]
    pub fn str_attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .get(key)
            .and_then(|v| v.value().as_str().map(str::to_owned))
    }

    /// Set an attribute, returning the previous value.
    pub fn set_attribute(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(key.into(), value)
    }

    /// Remove an attribute.
    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.attributes.remove(key).map(|(_, v)| v)
    }

    /// Snapshot of all attributes.
    #[must_use]
    pub fn attributes(&self) -> Attributes {
        self.attributes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Milliseconds since the epoch at which the connection was created.
    #[must_use]
    pub fn connected_at(&self) -> u64 {
        self.connected_at
    }

    /// Whether the connection has been unregistered.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether a send could currently succeed.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        !self.is_closed() && self.sink.is_open()
    }

    /// Mark the connection closed. Returns `true` on the first call only.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Push a frame to the connection's sink.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] without touching the sink if the
    /// connection was already unregistered.
    pub async fn send(&self, frame: Arc<Frame>) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.sink.send(frame).await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use serde_json::json;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_string() {
        let id: ConnectionId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }

    #[test]
    fn test_attributes() {
        let mut attrs = Attributes::new();
        attrs.insert("channel".into(), json!("first"));
        let conn = Connection::new("c1".into(), RecordingSink::new(), attrs);

        assert_eq!(conn.str_attribute("channel").as_deref(), Some("first"));
        assert_eq!(conn.set_attribute("channel", json!("second")), Some(json!("first")));
        assert_eq!(conn.attribute("channel"), Some(json!("second")));
        assert_eq!(conn.remove_attribute("channel"), Some(json!("second")));
        assert!(conn.attributes().is_empty());
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let sink = RecordingSink::new();
        let conn = Connection::new("c1".into(), sink.clone(), Attributes::new());

        conn.send(Arc::new(Frame::ping())).await.unwrap();
        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
        assert_eq!(
            conn.send(Arc::new(Frame::ping())).await,
            Err(SendError::Closed)
        );
        assert_eq!(sink.frames().len(), 1);
    }

    #[test]
    fn test_reachable_follows_sink() {
        let sink = RecordingSink::new();
        let conn = Connection::new("c1".into(), sink.clone(), Attributes::new());
        assert!(conn.is_reachable());
        sink.close();
        assert!(!conn.is_reachable());
        assert!(!conn.is_closed());
    }
}
