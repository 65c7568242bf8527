//! Shared fixtures for the Herald benchmarks.

use herald_core::{Attributes, ChannelStore, EventSelector, Hub, ServiceEvent};
use herald_transport::{FrameReceiver, QueueSink};
use std::sync::Arc;

/// Channel every fixture connection joins.
pub const CHANNEL: &str = "bench";

/// A hub whose app publisher targets [`CHANNEL`], with its clients.
pub struct Fixture {
    /// The hub under test.
    pub hub: Hub,
    /// One receiver per connected client.
    pub receivers: Vec<FrameReceiver>,
}

impl Fixture {
    /// Connect `clients` queue-backed connections to [`CHANNEL`].
    #[must_use]
    pub fn new(clients: usize) -> Self {
        let hub = Hub::new();
        hub.publish_app(
            EventSelector::All,
            |_: &ServiceEvent, channels: &ChannelStore| channels.members(CHANNEL),
        );

        let receivers = (0..clients)
            .map(|_| {
                let (sink, rx) = QueueSink::channel(1024);
                let conn = hub.connect(Arc::new(sink), Attributes::new());
                hub.channels().join(CHANNEL, &conn);
                rx
            })
            .collect();

        Self { hub, receivers }
    }

    /// Drop every queued frame, returning how many there were.
    pub fn drain(&mut self) -> usize {
        self.receivers.iter_mut().map(|rx| rx.drain().len()).sum()
    }
}

/// Runtime for driving async dispatch from synchronous benchmarks.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
#[must_use]
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
}
