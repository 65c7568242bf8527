//! In-memory record services.
//!
//! Each service stores JSON objects keyed by a numeric `id` and announces
//! every mutation through its [`EventSource`].

use crate::metrics;
use dashmap::DashMap;
use herald_core::{DispatchReport, EventContext, EventError, EventSource};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;

/// Errors returned by a [`MemoryService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No record has this id.
    #[error("No record found for id '{0}'")]
    NotFound(String),

    /// The request body is not a JSON object.
    #[error("Record data must be a JSON object")]
    InvalidData,

    /// The event could not be emitted.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// A service holding records in memory.
#[derive(Debug)]
pub struct MemoryService {
    source: EventSource,
    records: DashMap<u64, Value>,
    next_id: AtomicU64,
}

impl MemoryService {
    /// Create an empty service emitting through `source`.
    #[must_use]
    pub fn new(source: EventSource) -> Self {
        Self {
            source,
            records: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.source.service()
    }

    /// All records, ordered by id.
    #[must_use]
    pub fn find(&self) -> Vec<Value> {
        let mut records: Vec<(u64, Value)> = self
            .records
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        records.sort_unstable_by_key(|(id, _)| *id);
        records.into_iter().map(|(_, record)| record).collect()
    }

    /// Look up a record.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id.
    pub fn get(&self, id: &str) -> Result<Value, ServiceError> {
        let key = parse_id(id)?;
        self.records
            .get(&key)
            .map(|r| r.value().clone())
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Store a new record and emit `created`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidData`] if `data` is not an object.
    pub async fn create(&self, data: Value, context: EventContext) -> Result<Value, ServiceError> {
        let mut fields = into_object(data)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        fields.insert("id".into(), Value::from(id));
        let record = Value::Object(fields);
        self.records.insert(id, record.clone());

        let start = Instant::now();
        let report = self.source.emit_created(record.clone(), context).await;
        observe(&report, start);
        Ok(record)
    }

    /// Replace a record and emit `updated`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id and
    /// [`ServiceError::InvalidData`] if `data` is not an object.
    pub async fn update(
        &self,
        id: &str,
        data: Value,
        context: EventContext,
    ) -> Result<Value, ServiceError> {
        let key = parse_id(id)?;
        let mut fields = into_object(data)?;
        fields.insert("id".into(), Value::from(key));
        let record = Value::Object(fields);

        match self.records.get_mut(&key) {
            Some(mut entry) => *entry = record.clone(),
            None => return Err(ServiceError::NotFound(id.to_string())),
        }

        let start = Instant::now();
        let report = self.source.emit_updated(key, record.clone(), context).await;
        observe(&report, start);
        Ok(record)
    }

    /// Merge fields into a record and emit `patched`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id and
    /// [`ServiceError::InvalidData`] if `data` is not an object.
    pub async fn patch(
        &self,
        id: &str,
        data: Value,
        context: EventContext,
    ) -> Result<Value, ServiceError> {
        let key = parse_id(id)?;
        let changes = into_object(data)?;

        let record = {
            let mut entry = self
                .records
                .get_mut(&key)
                .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
            if let Value::Object(fields) = entry.value_mut() {
                for (field, value) in changes {
                    if field != "id" {
                        fields.insert(field, value);
                    }
                }
            }
            entry.value().clone()
        };

        let start = Instant::now();
        let report = self.source.emit_patched(key, record.clone(), context).await;
        observe(&report, start);
        Ok(record)
    }

    /// Delete a record and emit `removed`.
    ///
    /// Unless the context already carries one, the removed record is
    /// broadcast in place of the bare id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id.
    pub async fn remove(&self, id: &str, mut context: EventContext) -> Result<Value, ServiceError> {
        let key = parse_id(id)?;
        let (_, record) = self
            .records
            .remove(&key)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;

        if context.dispatch.is_none() {
            context.dispatch = Some(record.clone());
        }
        let start = Instant::now();
        let report = self.source.emit_removed(key, context).await;
        observe(&report, start);
        Ok(record)
    }

    /// Emit a custom event.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Event`] for a malformed event name.
    pub async fn emit(
        &self,
        event: &str,
        payload: Value,
        context: EventContext,
    ) -> Result<DispatchReport, ServiceError> {
        let start = Instant::now();
        let report = self.source.emit_custom_with(event, payload, context).await?;
        observe(&report, start);
        Ok(report)
    }
}

fn parse_id(id: &str) -> Result<u64, ServiceError> {
    id.parse()
        .map_err(|_| ServiceError::NotFound(id.to_string()))
}

fn into_object(data: Value) -> Result<Map<String, Value>, ServiceError> {
    match data {
        Value::Object(fields) => Ok(fields),
        _ => Err(ServiceError::InvalidData),
    }
}

fn observe(report: &DispatchReport, start: Instant) {
    metrics::record_dispatch(report, start.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{Attributes, ChannelStore, EventSelector, Hub, ServiceEvent};
    use herald_transport::{FrameReceiver, QueueSink};
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (MemoryService, FrameReceiver) {
        let hub = Hub::new();
        hub.publish_app(
            EventSelector::All,
            |_: &ServiceEvent, channels: &ChannelStore| channels.all(),
        );
        let (sink, rx) = QueueSink::channel(16);
        let conn = hub.connect(Arc::new(sink), Attributes::new());
        hub.channels().join("default", &conn);
        (MemoryService::new(hub.service("messages").unwrap()), rx)
    }

    fn received(rx: &mut FrameReceiver) -> Vec<(String, Value)> {
        rx.drain()
            .iter()
            .filter_map(|f| Some((f.event_name()?.to_string(), f.payload()?.clone())))
            .collect()
    }

    #[tokio::test]
    async fn test_crud_emits_events() {
        let (service, mut rx) = setup();

        let created = service
            .create(json!({"text": "hello"}), EventContext::new())
            .await
            .unwrap();
        assert_eq!(created, json!({"id": 0, "text": "hello"}));

        service
            .update("0", json!({"text": "replaced"}), EventContext::new())
            .await
            .unwrap();
        let patched = service
            .patch("0", json!({"read": true, "id": 9}), EventContext::new())
            .await
            .unwrap();
        assert_eq!(patched, json!({"id": 0, "text": "replaced", "read": true}));

        service.remove("0", EventContext::new()).await.unwrap();
        assert!(service.find().is_empty());

        assert_eq!(
            received(&mut rx),
            vec![
                ("messages created".into(), json!({"id": 0, "text": "hello"})),
                ("messages updated".into(), json!({"id": 0, "text": "replaced"})),
                ("messages patched".into(), patched.clone()),
                ("messages removed".into(), patched),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_id_emits_nothing() {
        let (service, mut rx) = setup();

        assert!(matches!(
            service.update("7", json!({}), EventContext::new()).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.remove("abc", EventContext::new()).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_object_data() {
        let (service, _rx) = setup();
        assert!(matches!(
            service.create(json!("text"), EventContext::new()).await,
            Err(ServiceError::InvalidData)
        ));
    }

    #[tokio::test]
    async fn test_custom_event() {
        let (service, mut rx) = setup();
        let report = service
            .emit("log", json!({"message": "hi"}), EventContext::new())
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(
            received(&mut rx),
            vec![("messages log".into(), json!({"message": "hi"}))]
        );
        assert!(service.emit(" ", json!({}), EventContext::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_find_is_ordered() {
        let (service, _rx) = setup();
        for n in 0..3 {
            service
                .create(json!({"n": n}), EventContext::new())
                .await
                .unwrap();
        }
        let ids: Vec<Value> = service.find().iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(0), json!(1), json!(2)]);
        assert_eq!(service.get("1").unwrap()["n"], json!(1));
    }
}
