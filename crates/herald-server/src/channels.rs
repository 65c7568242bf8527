//! Channel routing for the bundled server.
//!
//! New connections join the channel named by their `channel` attribute, or
//! the default channel. Events go to the channel named by the `room` field of
//! the broadcast payload, or the default channel, skipping the connection
//! that caused them.

use crate::metrics;
use herald_core::{Audience, ChannelStore, EventSelector, Hub, Publisher, ServiceEvent};
use serde_json::Value;
use tracing::debug;

/// Connection attribute naming the channel to join.
pub const CHANNEL_ATTRIBUTE: &str = "channel";

/// Payload field naming the channel to broadcast to.
pub const ROOM_FIELD: &str = "room";

/// App-wide publisher routing events by room.
#[derive(Debug, Clone)]
pub struct RoomPublisher {
    default_channel: String,
}

impl RoomPublisher {
    /// Route events without a room to `default_channel`.
    #[must_use]
    pub fn new(default_channel: impl Into<String>) -> Self {
        Self {
            default_channel: default_channel.into(),
        }
    }
}

impl Publisher for RoomPublisher {
    fn audience(&self, event: &ServiceEvent, channels: &ChannelStore) -> Audience {
        let room = event
            .broadcast_payload()
            .get(ROOM_FIELD)
            .and_then(Value::as_str)
            .unwrap_or(&self.default_channel);
        channels
            .members(room)
            .exclude(event.context.origin.as_ref())
    }
}

/// Install the join hook and the app-wide publisher on `hub`.
pub fn install(hub: &Hub, default_channel: &str) {
    let fallback = default_channel.to_string();
    hub.on_connection(move |hub, connection| {
        let channel = connection
            .str_attribute(CHANNEL_ATTRIBUTE)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| fallback.clone());
        hub.channels().join(&channel, connection);
        debug!(connection = %connection.id(), channel = %channel, "Joined channel");
        metrics::set_active_channels(hub.channels().stats().channel_count);
    });

    hub.publish_app(EventSelector::All, RoomPublisher::new(default_channel));
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{Attributes, EventContext};
    use herald_transport::QueueSink;
    use serde_json::json;
    use std::sync::Arc;

    fn hub() -> Hub {
        let hub = Hub::new();
        install(&hub, "default");
        hub
    }

    fn attrs(channel: Option<&str>) -> Attributes {
        let mut attrs = Attributes::new();
        if let Some(channel) = channel {
            attrs.insert(CHANNEL_ATTRIBUTE.into(), json!(channel));
        }
        attrs
    }

    #[test]
    fn test_join_hook_uses_attribute_or_default() {
        let hub = hub();
        let (a, _rx_a) = QueueSink::channel(8);
        let (b, _rx_b) = QueueSink::channel(8);

        let in_room = hub.connect(Arc::new(a), attrs(Some("lobby")));
        let in_default = hub.connect(Arc::new(b), attrs(None));

        assert!(hub.channels().is_member("lobby", in_room.id()));
        assert!(hub.channels().is_member("default", in_default.id()));
        assert!(!hub.channels().is_member("default", in_room.id()));
    }

    #[tokio::test]
    async fn test_room_routing_excludes_origin() {
        let hub = hub();
        let (a, mut rx_a) = QueueSink::channel(8);
        let (b, mut rx_b) = QueueSink::channel(8);
        let (c, mut rx_c) = QueueSink::channel(8);
        let origin = hub.connect(Arc::new(a), attrs(Some("lobby")));
        hub.connect(Arc::new(b), attrs(Some("lobby")));
        hub.connect(Arc::new(c), attrs(None));

        let messages = hub.service("messages").unwrap();
        let report = messages
            .emit_created(
                json!({"room": "lobby", "text": "hi"}),
                EventContext::new().with_origin(origin.id().clone()),
            )
            .await;

        assert_eq!(report.recipients, 1);
        assert!(rx_a.try_recv().is_none());
        assert_eq!(
            rx_b.try_recv().unwrap().event_name(),
            Some("messages created")
        );
        assert!(rx_c.try_recv().is_none());

        messages
            .emit_created(json!({"text": "to everyone"}), EventContext::new())
            .await;
        assert_eq!(
            rx_c.try_recv().unwrap().payload(),
            Some(&json!({"text": "to everyone"}))
        );
    }
}
