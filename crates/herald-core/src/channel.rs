//! Channels: named sets of connections.
//!
//! Channels are created lazily on first join and looking up an unknown
//! channel yields an empty [`Audience`], never an error.

use crate::audience::Audience;
use crate::connection::{Connection, ConnectionId};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A channel identifier.
pub type ChannelName = String;

/// Channel store configuration.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    /// Remove a channel once its last member leaves.
    pub auto_delete_empty_channels: bool,
}

/// A named set of connections.
#[derive(Debug)]
pub struct Channel {
    name: ChannelName,
    members: HashMap<ConnectionId, Arc<Connection>>,
}

impl Channel {
    /// Create an empty channel.
    #[must_use]
    pub fn new(name: impl Into<ChannelName>) -> Self {
        Self {
            name: name.into(),
            members: HashMap::new(),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the channel has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    /// Add a connection. Returns `true` if it was not already a member.
    pub fn insert(&mut self, connection: Arc<Connection>) -> bool {
        let id = connection.id().clone();
        self.members.insert(id, connection).is_none()
    }

    /// Remove a connection. Returns `true` if it was a member.
    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        self.members.remove(id).is_some()
    }

    /// Snapshot the members as an audience.
    #[must_use]
    pub fn audience(&self) -> Audience {
        self.members.values().cloned().collect()
    }

    fn extend_audience(&self, audience: &mut Audience) {
        audience.extend(self.members.values().cloned());
    }
}

/// All channels of a hub, plus the reverse index used on disconnect.
///
/// Locks are always taken in the order membership index, then channel.
#[derive(Debug, Default)]
pub struct ChannelStore {
    channels: DashMap<ChannelName, Channel>,
    memberships: DashMap<ConnectionId, HashSet<ChannelName>>,
    config: ChannelConfig,
}

impl ChannelStore {
    /// Create a store with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    /// Create a store with custom configuration.
    #[must_use]
    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            channels: DashMap::new(),
            memberships: DashMap::new(),
            config,
        }
    }

    /// Add a connection to a channel.
    ///
    /// Joining twice has no further effect and joining with an unregistered
    /// connection is ignored. Returns `true` if membership changed.
    pub fn join(&self, name: &str, connection: &Arc<Connection>) -> bool {
        let mut joined = self
            .memberships
            .entry(connection.id().clone())
            .or_default();

        // Checked under the membership lock so `leave_all` cannot miss us.
        if connection.is_closed() {
            drop(joined);
            self.memberships
                .remove_if(connection.id(), |_, names| names.is_empty());
            return false;
        }

        if !joined.insert(name.to_string()) {
            return false;
        }

        let mut channel = self.channels.entry(name.to_string()).or_insert_with(|| {
            debug!(channel = %name, "Creating channel");
            Channel::new(name)
        });
        channel.insert(Arc::clone(connection));

        debug!(
            channel = %name,
            connection = %connection.id(),
            members = channel.len(),
            "Joined channel"
        );
        true
    }

    /// Remove a connection from a channel. Returns `true` if it was a member.
    pub fn leave(&self, name: &str, id: &ConnectionId) -> bool {
        {
            let Some(mut names) = self.memberships.get_mut(id) else {
                return false;
            };
            if !names.remove(name) {
                return false;
            }
            // Index guard held until the channel agrees with it.
            self.remove_member(name, id);
        }
        self.memberships.remove_if(id, |_, names| names.is_empty());

        debug!(channel = %name, connection = %id, "Left channel");
        true
    }

    /// Remove every member of a channel matching `predicate`.
    ///
    /// Returns the number of connections removed.
    pub fn leave_where(&self, name: &str, predicate: impl Fn(&Connection) -> bool) -> usize {
        let matching: Vec<ConnectionId> = match self.channels.get(name) {
            Some(channel) => channel
                .members
                .values()
                .filter(|c| predicate(c))
                .map(|c| c.id().clone())
                .collect(),
            None => return 0,
        };

        matching.iter().filter(|id| self.leave(name, id)).count()
    }

    /// Remove a connection from every channel it belongs to.
    ///
    /// Returns the names of the channels it was removed from.
    pub fn leave_all(&self, id: &ConnectionId) -> Vec<ChannelName> {
        let names: Vec<ChannelName> = {
            let Some(mut names) = self.memberships.get_mut(id) else {
                return Vec::new();
            };
            let names: Vec<ChannelName> = names.drain().collect();
            for name in &names {
                self.remove_member(name, id);
            }
            names
        };
        self.memberships.remove_if(id, |_, names| names.is_empty());

        debug!(connection = %id, channels = names.len(), "Left all channels");
        names
    }

    fn remove_member(&self, name: &str, id: &ConnectionId) {
        if let Some(mut channel) = self.channels.get_mut(name) {
            channel.remove(id);
        }
        if self.config.auto_delete_empty_channels
            && self
                .channels
                .remove_if(name, |_, channel| channel.is_empty())
                .is_some()
        {
            debug!(channel = %name, "Deleted empty channel");
        }
    }

    /// Members of a channel. Unknown channels are empty.
    #[must_use]
    pub fn members(&self, name: &str) -> Audience {
        self.channels
            .get(name)
            .map(|c| c.audience())
            .unwrap_or_default()
    }

    /// Union of the members of several channels, duplicates collapsed.
    #[must_use]
    pub fn combine<I, S>(&self, names: I) -> Audience
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut audience = Audience::new();
        for name in names {
            if let Some(channel) = self.channels.get(name.as_ref()) {
                channel.extend_audience(&mut audience);
            }
        }
        audience
    }

    /// Every connection that is in at least one channel.
    #[must_use]
    pub fn all(&self) -> Audience {
        let mut audience = Audience::new();
        for channel in self.channels.iter() {
            channel.extend_audience(&mut audience);
        }
        audience
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Number of members of a channel.
    #[must_use]
    pub fn member_count(&self, name: &str) -> usize {
        self.channels.get(name).map(|c| c.len()).unwrap_or(0)
    }

    /// Check if a connection is a member of a channel.
    #[must_use]
    pub fn is_member(&self, name: &str, id: &ConnectionId) -> bool {
        self.channels
            .get(name)
            .map(|c| c.contains(id))
            .unwrap_or(false)
    }

    /// Names of all channels.
    #[must_use]
    pub fn names(&self) -> Vec<ChannelName> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Channels a connection belongs to.
    #[must_use]
    pub fn channels_of(&self, id: &ConnectionId) -> Vec<ChannelName> {
        self.memberships
            .get(id)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Store statistics.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            channel_count: self.channels.len(),
            member_connections: self.memberships.len(),
            total_memberships: self.memberships.iter().map(|m| m.len()).sum(),
        }
    }
}

/// Channel store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Number of channels.
    pub channel_count: usize,
    /// Connections that belong to at least one channel.
    pub member_connections: usize,
    /// Sum of all channel memberships.
    pub total_memberships: usize,
}
