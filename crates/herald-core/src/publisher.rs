//! Publisher table: which audience each service event goes to.
//!
//! Lookup order for an event `(service, kind)`:
//!
//! 1. the service's publisher for `kind`
//! 2. the service's publisher for all events
//! 3. the app-wide publisher for `kind`
//! 4. the app-wide publisher for all events
//!
//! If none matches, the event is not broadcast.

use crate::audience::Audience;
use crate::channel::ChannelStore;
use crate::event::{EventKind, ServiceEvent};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A publication filter.
///
/// Any `Fn(&ServiceEvent, &ChannelStore) -> Audience` closure is a publisher.
pub trait Publisher: Send + Sync {
    /// Resolve the audience for an event.
    fn audience(&self, event: &ServiceEvent, channels: &ChannelStore) -> Audience;
}

impl<F> Publisher for F
where
    F: Fn(&ServiceEvent, &ChannelStore) -> Audience + Send + Sync,
{
    fn audience(&self, event: &ServiceEvent, channels: &ChannelStore) -> Audience {
        self(event, channels)
    }
}

/// Which events of a scope a publisher applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventSelector {
    /// Every event without a more specific registration.
    All,
    /// A single event kind.
    Kind(EventKind),
}

impl From<EventKind> for EventSelector {
    fn from(kind: EventKind) -> Self {
        EventSelector::Kind(kind)
    }
}

impl fmt::Display for EventSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSelector::All => f.write_str("*"),
            EventSelector::Kind(kind) => kind.fmt(f),
        }
    }
}

/// Where a publisher is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Applies to every service.
    App,
    /// Applies to one named service.
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PublisherKey {
    scope: Scope,
    selector: EventSelector,
}

/// Registered publishers, at most one per (scope, selector).
#[derive(Default)]
pub struct PublisherTable {
    entries: DashMap<PublisherKey, Arc<dyn Publisher>>,
}

impl PublisherTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a publisher for a service, replacing any previous one.
    ///
    /// Returns `true` if a previous registration was replaced.
    pub fn publish(
        &self,
        service: impl Into<String>,
        selector: impl Into<EventSelector>,
        publisher: impl Publisher + 'static,
    ) -> bool {
        self.insert(Scope::Service(service.into()), selector.into(), Arc::new(publisher))
    }

    /// Register an app-wide publisher, used when a service has none.
    ///
    /// Returns `true` if a previous registration was replaced.
    pub fn publish_app(
        &self,
        selector: impl Into<EventSelector>,
        publisher: impl Publisher + 'static,
    ) -> bool {
        self.insert(Scope::App, selector.into(), Arc::new(publisher))
    }

    fn insert(
        &self,
        scope: Scope,
        selector: EventSelector,
        publisher: Arc<dyn Publisher>,
    ) -> bool {
        debug!(scope = ?scope, event = %selector, "Registering publisher");
        self.entries
            .insert(PublisherKey { scope, selector }, publisher)
            .is_some()
    }

    /// Remove a registration. Returns `true` if one existed.
    pub fn unpublish(&self, scope: Scope, selector: impl Into<EventSelector>) -> bool {
        let key = PublisherKey {
            scope,
            selector: selector.into(),
        };
        self.entries.remove(&key).is_some()
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the publisher that applies to an event.
    #[must_use]
    pub fn lookup(&self, service: &str, kind: &EventKind) -> Option<Arc<dyn Publisher>> {
        let service = Scope::Service(service.to_string());
        let candidates = [
            (service.clone(), EventSelector::Kind(kind.clone())),
            (service, EventSelector::All),
            (Scope::App, EventSelector::Kind(kind.clone())),
            (Scope::App, EventSelector::All),
        ];

        candidates.into_iter().find_map(|(scope, selector)| {
            self.entries
                .get(&PublisherKey { scope, selector })
                .map(|entry| Arc::clone(entry.value()))
        })
    }

    /// Resolve the audience of an event.
    ///
    /// Returns `None` if no publisher applies. The filter runs with no table
    /// lock held, so it may itself register publishers.
    #[must_use]
    pub fn resolve(&self, event: &ServiceEvent, channels: &ChannelStore) -> Option<Audience> {
        let publisher = self.lookup(&event.service, &event.kind)?;
        Some(publisher.audience(event, channels))
    }
}

impl fmt::Debug for PublisherTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}
