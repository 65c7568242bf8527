//! Event dispatch: resolve the audience, then fan out.
//!
//! Every recipient is delivered to from its own task. A shared semaphore
//! bounds how many sends are in flight across all dispatches and every send
//! is wrapped in a timeout, so one stalled client cannot hold up the rest.
//! Delivery failures are logged and counted, never returned.

use crate::audience::{Audience, Recipient};
use crate::channel::ChannelStore;
use crate::connection::SendError;
use crate::event::ServiceEvent;
use crate::publisher::PublisherTable;
use herald_protocol::Frame;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound for a single send.
    pub send_timeout: Duration,
    /// Maximum number of sends in flight at once.
    pub max_concurrent_sends: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            max_concurrent_sends: 1024,
        }
    }
}

/// Outcome of a single dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Wire event name.
    pub event: String,
    /// Whether a publisher applied to the event.
    pub published: bool,
    /// Size of the resolved audience.
    pub recipients: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    /// Sends that failed or timed out.
    pub failed: usize,
    /// Recipients that had disconnected before their send began.
    pub skipped: usize,
}

/// Cumulative dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events dispatched.
    pub events: u64,
    /// Events dropped because no publisher applied.
    pub unpublished: u64,
    /// Successful sends.
    pub delivered: u64,
    /// Failed sends.
    pub failed: u64,
    /// Skipped recipients.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    unpublished: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

enum Delivery {
    Delivered,
    Failed,
    Skipped,
}

/// Resolves publishers and fans events out to their audience.
#[derive(Debug)]
pub struct Dispatcher {
    channels: Arc<ChannelStore>,
    publishers: Arc<PublisherTable>,
    permits: Arc<Semaphore>,
    config: DispatchConfig,
    counters: Counters,
}

/// In-flight sends of one dispatch.
///
/// Dropping the dispatching future detaches the sends instead of aborting
/// them, so a cancelled caller does not cut the broadcast short.
struct Deliveries(JoinSet<Delivery>);

impl Drop for Deliveries {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

impl Dispatcher {
    /// Create a dispatcher over a channel store and publisher table.
    #[must_use]
    pub fn new(
        channels: Arc<ChannelStore>,
        publishers: Arc<PublisherTable>,
        config: DispatchConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_sends.max(1)));
        Self {
            channels,
            publishers,
            permits,
            config,
            counters: Counters::default(),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dispatch an event and wait until every delivery attempt has finished.
    pub async fn dispatch(&self, event: ServiceEvent) -> DispatchReport {
        self.counters.events.fetch_add(1, Ordering::Relaxed);
        let name = event.event_name();

        let Some(audience) = self.publishers.resolve(&event, &self.channels) else {
            self.counters.unpublished.fetch_add(1, Ordering::Relaxed);
            debug!(event = %name, "No publisher, not broadcasting");
            return DispatchReport {
                event: name,
                ..DispatchReport::default()
            };
        };

        let mut report = DispatchReport {
            event: name,
            published: true,
            recipients: audience.len(),
            ..DispatchReport::default()
        };
        if audience.is_empty() {
            debug!(event = %report.event, "Empty audience");
            return report;
        }

        let mut tasks = self.fan_out(&event, audience);
        while let Some(result) = tasks.0.join_next().await {
            match result {
                Ok(Delivery::Delivered) => report.delivered += 1,
                Ok(Delivery::Skipped) => report.skipped += 1,
                Ok(Delivery::Failed) => report.failed += 1,
                Err(e) => {
                    warn!(event = %report.event, error = %e, "Delivery task aborted");
                    report.failed += 1;
                }
            }
        }

        self.counters
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters
            .failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        self.counters
            .skipped
            .fetch_add(report.skipped as u64, Ordering::Relaxed);

        debug!(
            event = %report.event,
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Dispatched"
        );
        report
    }

    /// Dispatch an event in the background.
    pub fn dispatch_detached(self: &Arc<Self>, event: ServiceEvent) -> JoinHandle<DispatchReport> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.dispatch(event).await })
    }

    fn fan_out(&self, event: &ServiceEvent, audience: Audience) -> Deliveries {
        let name = event.event_name();
        let shared = Arc::new(event.to_frame(event.broadcast_payload().clone()));
        let mut tasks = JoinSet::new();

        for Recipient {
            connection,
            payload,
        } in audience.into_recipients()
        {
            let frame = match payload {
                Some(payload) => Arc::new(Frame::event(name.clone(), Value::clone(&payload))),
                None => Arc::clone(&shared),
            };
            let permits = Arc::clone(&self.permits);
            let send_timeout = self.config.send_timeout;

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Delivery::Failed;
                };

                if !connection.is_reachable() {
                    trace!(connection = %connection.id(), "Skipping closed connection");
                    return Delivery::Skipped;
                }

                let result = match timeout(send_timeout, connection.send(frame)).await {
                    Ok(result) => result,
                    Err(_) => Err(SendError::Timeout),
                };

                match result {
                    Ok(()) => {
                        trace!(connection = %connection.id(), "Delivered");
                        Delivery::Delivered
                    }
                    Err(e) => {
                        warn!(connection = %connection.id(), error = %e, "Delivery failed");
                        Delivery::Failed
                    }
                }
            });
        }

        Deliveries(tasks)
    }

    /// Cumulative counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            events: self.counters.events.load(Ordering::Relaxed),
            unpublished: self.counters.unpublished.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}
