//! The interface services use to announce their mutations.

use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::event::{EventContext, EventError, EventKind, ServiceEvent};
use serde_json::{json, Value};
use std::sync::Arc;

/// Emits the events of one named service.
///
/// Each call builds a [`ServiceEvent`] and hands it to the dispatcher, then
/// waits for the fan-out to finish. Delivery problems never surface here.
#[derive(Debug, Clone)]
pub struct EventSource {
    service: Arc<str>,
    dispatcher: Arc<Dispatcher>,
}

impl EventSource {
    /// Create an event source for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidArgument`] if the service name is empty
    /// or contains whitespace.
    pub fn new(service: &str, dispatcher: Arc<Dispatcher>) -> Result<Self, EventError> {
        if service.trim().is_empty() {
            return Err(EventError::InvalidArgument("service name cannot be empty"));
        }
        if service.chars().any(char::is_whitespace) {
            return Err(EventError::InvalidArgument(
                "service name cannot contain whitespace",
            ));
        }
        Ok(Self {
            service: Arc::from(service),
            dispatcher,
        })
    }

    /// Name of the service.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Emit `created` with the new record.
    pub async fn emit_created(&self, payload: Value, context: EventContext) -> DispatchReport {
        self.emit(EventKind::Created, payload, context).await
    }

    /// Emit `updated` with the replaced record.
    pub async fn emit_updated(
        &self,
        id: impl Into<Value>,
        payload: Value,
        mut context: EventContext,
    ) -> DispatchReport {
        context.id = Some(id.into());
        self.emit(EventKind::Updated, payload, context).await
    }

    /// Emit `patched` with the patched record.
    pub async fn emit_patched(
        &self,
        id: impl Into<Value>,
        payload: Value,
        mut context: EventContext,
    ) -> DispatchReport {
        context.id = Some(id.into());
        self.emit(EventKind::Patched, payload, context).await
    }

    /// Emit `removed`. The payload is `{"id": id}` unless the context
    /// carries a dispatch override.
    pub async fn emit_removed(&self, id: impl Into<Value>, mut context: EventContext) -> DispatchReport {
        let id = id.into();
        context.id = Some(id.clone());
        self.emit(EventKind::Removed, json!({ "id": id }), context)
            .await
    }

    /// Emit a custom event such as `log`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidArgument`] for an empty or malformed name.
    pub async fn emit_custom(&self, name: &str, payload: Value) -> Result<DispatchReport, EventError> {
        self.emit_custom_with(name, payload, EventContext::new()).await
    }

    /// Emit a custom event with an explicit context.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidArgument`] for an empty or malformed name.
    pub async fn emit_custom_with(
        &self,
        name: &str,
        payload: Value,
        context: EventContext,
    ) -> Result<DispatchReport, EventError> {
        let kind = EventKind::parse(name)?;
        Ok(self.emit(kind, payload, context).await)
    }

    async fn emit(&self, kind: EventKind, payload: Value, context: EventContext) -> DispatchReport {
        let event = ServiceEvent::new(self.service.as_ref(), kind, payload, context);
        self.dispatcher.dispatch(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audience::Audience;
    use crate::channel::ChannelStore;
    use crate::connection::{Attributes, Connection};
    use crate::dispatcher::DispatchConfig;
    use crate::publisher::{EventSelector, PublisherTable};
    use crate::testing::RecordingSink;

    fn setup() -> (EventSource, Arc<RecordingSink>) {
        let channels = Arc::new(ChannelStore::new());
        let publishers = Arc::new(PublisherTable::new());
        let sink = RecordingSink::new();
        let conn = Arc::new(Connection::new("c1".into(), sink.clone(), Attributes::new()));
        channels.join("default", &conn);
        publishers.publish(
            "messages",
            EventSelector::All,
            |_: &ServiceEvent, channels: &ChannelStore| -> Audience { channels.members("default") },
        );

        let dispatcher = Arc::new(Dispatcher::new(channels, publishers, DispatchConfig::default()));
        (EventSource::new("messages", dispatcher).unwrap(), sink)
    }

    #[test]
    fn test_rejects_bad_service_name() {
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(ChannelStore::new()),
            Arc::new(PublisherTable::new()),
            DispatchConfig::default(),
        ));
        assert!(matches!(
            EventSource::new("", Arc::clone(&dispatcher)),
            Err(EventError::InvalidArgument(_))
        ));
        assert!(EventSource::new("my service", dispatcher).is_err());
    }

    #[tokio::test]
    async fn test_standard_events() {
        let (source, sink) = setup();

        source.emit_created(json!({"id": 1}), EventContext::new()).await;
        source
            .emit_updated(1, json!({"id": 1, "v": 2}), EventContext::new())
            .await;
        source
            .emit_patched(1, json!({"id": 1, "v": 3}), EventContext::new())
            .await;
        source.emit_removed(1, EventContext::new()).await;

        let names: Vec<String> = sink.events().into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![
                "messages created",
                "messages updated",
                "messages patched",
                "messages removed"
            ]
        );
        assert_eq!(sink.events()[3].1, json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_custom_event_is_verbatim() {
        let (source, sink) = setup();
        let payload = json!({"message": "hello", "data": {"level": "info"}});

        let report = source.emit_custom("log", payload.clone()).await.unwrap();
        assert_eq!(report.event, "messages log");
        assert_eq!(sink.events(), vec![("messages log".to_string(), payload)]);
    }

    #[tokio::test]
    async fn test_custom_event_rejects_empty_name() {
        let (source, sink) = setup();
        assert!(matches!(
            source.emit_custom("", json!({})).await,
            Err(EventError::InvalidArgument(_))
        ));
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_removed_respects_dispatch_override() {
        let (source, sink) = setup();
        source
            .emit_removed("abc", EventContext::new().with_dispatch(json!({"id": "abc", "text": "bye"})))
            .await;
        assert_eq!(sink.events()[0].1, json!({"id": "abc", "text": "bye"}));
    }
}
