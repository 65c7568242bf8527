//! The resolved set of connections an event is delivered to.
//!
//! Channel lookups and publisher filters both produce an [`Audience`]. It is
//! a snapshot: later channel membership changes do not alter it.

use crate::connection::{Connection, ConnectionId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One member of an audience.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// The connection to deliver to.
    pub connection: Arc<Connection>,
    /// Payload to send instead of the event's own payload.
    pub payload: Option<Arc<Value>>,
}

/// A deduplicated set of connections.
#[derive(Debug, Clone, Default)]
pub struct Audience {
    recipients: HashMap<ConnectionId, Recipient>,
}

impl Audience {
    /// Create an empty audience.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an audience from explicit connections.
    #[must_use]
    pub fn from_connections(connections: impl IntoIterator<Item = Arc<Connection>>) -> Self {
        connections.into_iter().collect()
    }

    /// Add a connection. Returns `false` if it was already present, in which
    /// case the existing entry (and its payload override) is kept.
    pub fn insert(&mut self, connection: Arc<Connection>) -> bool {
        let id = connection.id().clone();
        if self.recipients.contains_key(&id) {
            return false;
        }
        self.recipients.insert(
            id,
            Recipient {
                connection,
                payload: None,
            },
        );
        true
    }

    /// Number of distinct connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    /// Whether nobody would receive the event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Whether a connection is part of the audience.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.recipients.contains_key(id)
    }

    /// IDs of all members, in no particular order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.recipients.keys().cloned().collect()
    }

    /// Iterate over the member connections.
    pub fn connections(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.recipients.values().map(|r| &r.connection)
    }

    /// Merge another audience into this one.
    ///
    /// A connection present in both appears once; the entry from `self` wins.
    #[must_use]
    pub fn union(mut self, other: Audience) -> Self {
        for (id, recipient) in other.recipients {
            self.recipients.entry(id).or_insert(recipient);
        }
        self
    }

    /// Keep only the connections matching a predicate.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&Connection) -> bool) -> Self {
        self.recipients.retain(|_, r| predicate(&r.connection));
        self
    }

    /// Drop a single connection, typically the one that caused the event.
    #[must_use]
    pub fn exclude(mut self, id: Option<&ConnectionId>) -> Self {
        if let Some(id) = id {
            self.recipients.remove(id);
        }
        self
    }

    /// Send `payload` to every current member instead of the event payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        let payload = Arc::new(payload);
        for recipient in self.recipients.values_mut() {
            recipient.payload = Some(Arc::clone(&payload));
        }
        self
    }

    /// Consume the audience into its recipients.
    #[must_use]
    pub fn into_recipients(self) -> Vec<Recipient> {
        self.recipients.into_values().collect()
    }
}

impl FromIterator<Arc<Connection>> for Audience {
    fn from_iter<I: IntoIterator<Item = Arc<Connection>>>(iter: I) -> Self {
        let mut audience = Audience::new();
        for connection in iter {
            audience.insert(connection);
        }
        audience
    }
}

impl Extend<Arc<Connection>> for Audience {
    fn extend<I: IntoIterator<Item = Arc<Connection>>>(&mut self, iter: I) {
        for connection in iter {
            self.insert(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Attributes;
    use crate::testing::RecordingSink;
    use serde_json::json;

    fn conn(id: &str) -> Arc<Connection> {
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), json!(id));
        Arc::new(Connection::new(id.into(), RecordingSink::new(), attrs))
    }

    #[test]
    fn test_insert_is_deduplicated() {
        let a = conn("a");
        let mut audience = Audience::new();
        assert!(audience.insert(Arc::clone(&a)));
        assert!(!audience.insert(a));
        assert_eq!(audience.len(), 1);
    }

    #[test]
    fn test_union_collapses_duplicates() {
        let (a, b, c) = (conn("a"), conn("b"), conn("c"));
        let left = Audience::from_connections([Arc::clone(&a), Arc::clone(&b)]);
        let right = Audience::from_connections([b, c]);

        let merged = left.union(right);
        assert_eq!(merged.len(), 3);
        assert!(merged.contains(a.id()));
    }

    #[test]
    fn test_union_keeps_first_payload() {
        let a = conn("a");
        let left = Audience::from_connections([Arc::clone(&a)]).with_payload(json!("left"));
        let right = Audience::from_connections([a]).with_payload(json!("right"));

        let recipients = left.union(right).into_recipients();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].payload.as_deref(), Some(&json!("left")));
    }

    #[test]
    fn test_filter_and_exclude() {
        let (a, b, c) = (conn("a"), conn("b"), conn("c"));
        let audience = Audience::from_connections([a, Arc::clone(&b), c]);

        let filtered = audience
            .filter(|c| c.str_attribute("name").as_deref() != Some("a"))
            .exclude(Some(b.id()));
        assert_eq!(filtered.ids(), vec![ConnectionId::from("c")]);

        let untouched = Audience::from_connections([b]).exclude(None);
        assert_eq!(untouched.len(), 1);
    }
}
