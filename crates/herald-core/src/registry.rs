//! Registry of live connections.

use crate::channel::ChannelStore;
use crate::connection::{Attributes, Connection, ConnectionId, EventSink};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Tracks every connected client.
///
/// The registry owns the lifetime of a connection: unregistering it closes
/// it and removes it from every channel before returning.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    channels: Arc<ChannelStore>,
}

impl ConnectionRegistry {
    /// Create a registry that keeps `channels` free of stale members.
    #[must_use]
    pub fn new(channels: Arc<ChannelStore>) -> Self {
        Self {
            connections: DashMap::new(),
            channels,
        }
    }

    /// Register a new connection under a generated ID.
    pub fn register(&self, sink: Arc<dyn EventSink>, attributes: Attributes) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(ConnectionId::generate(), sink, attributes));
        self.connections
            .insert(connection.id().clone(), Arc::clone(&connection));

        debug!(
            connection = %connection.id(),
            total = self.connections.len(),
            "Registered connection"
        );
        connection
    }

    /// Unregister a connection.
    ///
    /// Returns the connection on the first call; later calls are no-ops and
    /// return `None`.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let (_, connection) = self.connections.remove(id)?;

        // Closed first, so a racing join sees it and backs off.
        connection.mark_closed();
        let channels = self.channels.leave_all(id);

        debug!(
            connection = %id,
            channels = channels.len(),
            total = self.connections.len(),
            "Unregistered connection"
        );
        Some(connection)
    }

    /// Look up a connection.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Set an attribute on a live connection.
    ///
    /// Returns `false` if the connection is unknown.
    pub fn set_attribute(&self, id: &ConnectionId, key: impl Into<String>, value: Value) -> bool {
        match self.connections.get(id) {
            Some(connection) => {
                connection.set_attribute(key, value);
                true
            }
            None => false,
        }
    }

    /// Read an attribute of a live connection.
    #[must_use]
    pub fn attribute(&self, id: &ConnectionId, key: &str) -> Option<Value> {
        self.connections.get(id)?.attribute(key)
    }

    /// IDs of all live connections.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
