//! The broadcast hub.
//!
//! A [`Hub`] owns the connection registry, channel store, publisher table
//! and dispatcher of one application. It is constructed explicitly and
//! shared as `Arc<Hub>`.

use crate::channel::{ChannelConfig, ChannelStore};
use crate::connection::{Attributes, Connection, ConnectionId, EventSink};
use crate::dispatcher::{DispatchConfig, DispatchReport, DispatchStats, Dispatcher};
use crate::event::{EventError, ServiceEvent};
use crate::publisher::{EventSelector, Publisher, PublisherTable};
use crate::registry::ConnectionRegistry;
use crate::source::EventSource;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Hub configuration.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Fan-out settings.
    pub dispatch: DispatchConfig,
    /// Channel store settings.
    pub channels: ChannelConfig,
}

/// Callback run for every new connection, typically to join channels.
pub type ConnectHook = Arc<dyn Fn(&Hub, &Arc<Connection>) + Send + Sync>;

/// Owner of all broadcast state.
pub struct Hub {
    registry: ConnectionRegistry,
    channels: Arc<ChannelStore>,
    publishers: Arc<PublisherTable>,
    dispatcher: Arc<Dispatcher>,
    connect_hooks: RwLock<Vec<ConnectHook>>,
}

impl Hub {
    /// Create a hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating hub with config: {:?}", config);
        let channels = Arc::new(ChannelStore::with_config(config.channels));
        let publishers = Arc::new(PublisherTable::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&channels),
            Arc::clone(&publishers),
            config.dispatch,
        ));

        Self {
            registry: ConnectionRegistry::new(Arc::clone(&channels)),
            channels,
            publishers,
            dispatcher,
            connect_hooks: RwLock::new(Vec::new()),
        }
    }

    /// Run `hook` for every connection registered from now on.
    pub fn on_connection(&self, hook: impl Fn(&Hub, &Arc<Connection>) + Send + Sync + 'static) {
        self.connect_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// Register a connection accepted by the transport layer.
    pub fn connect(&self, sink: Arc<dyn EventSink>, attributes: Attributes) -> Arc<Connection> {
        let connection = self.registry.register(sink, attributes);

        let hooks = self
            .connect_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            hook(self, &connection);
        }

        debug!(
            connection = %connection.id(),
            channels = ?self.channels.channels_of(connection.id()),
            "Connection ready"
        );
        connection
    }

    /// Unregister a connection. Safe to call more than once.
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        self.registry.unregister(id).is_some()
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The channel store.
    #[must_use]
    pub fn channels(&self) -> &Arc<ChannelStore> {
        &self.channels
    }

    /// The publisher table.
    #[must_use]
    pub fn publishers(&self) -> &Arc<PublisherTable> {
        &self.publishers
    }

    /// The dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Register a publisher for a service. See [`PublisherTable::publish`].
    pub fn publish(
        &self,
        service: impl Into<String>,
        selector: impl Into<EventSelector>,
        publisher: impl Publisher + 'static,
    ) -> bool {
        self.publishers.publish(service, selector, publisher)
    }

    /// Register an app-wide publisher. See [`PublisherTable::publish_app`].
    pub fn publish_app(
        &self,
        selector: impl Into<EventSelector>,
        publisher: impl Publisher + 'static,
    ) -> bool {
        self.publishers.publish_app(selector, publisher)
    }

    /// Event source for a named service.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidArgument`] for a malformed service name.
    pub fn service(&self, name: &str) -> Result<EventSource, EventError> {
        EventSource::new(name, Arc::clone(&self.dispatcher))
    }

    /// Dispatch an already built event.
    pub async fn emit(&self, event: ServiceEvent) -> DispatchReport {
        self.dispatcher.dispatch(event).await
    }

    /// Hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let channels = self.channels.stats();
        HubStats {
            connections: self.registry.len(),
            channels: channels.channel_count,
            memberships: channels.total_memberships,
            publishers: self.publishers.len(),
            dispatch: self.dispatcher.stats(),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy)]
pub struct HubStats {
    /// Live connections.
    pub connections: usize,
    /// Channels.
    pub channels: usize,
    /// Sum of channel memberships.
    pub memberships: usize,
    /// Registered publishers.
    pub publishers: usize,
    /// Dispatcher counters.
    pub dispatch: DispatchStats,
}
