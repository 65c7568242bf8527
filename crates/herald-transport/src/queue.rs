//! Bounded in-memory sink.
//!
//! [`QueueSink`] is the [`EventSink`] handed to the hub; the paired
//! [`FrameReceiver`] is drained by whatever writes to the client. On its own
//! it is also the in-process transport used by tests and benchmarks.

use async_trait::async_trait;
use herald_core::{EventSink, SendError};
use herald_protocol::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sending half of a frame queue.
#[derive(Debug, Clone)]
pub struct QueueSink {
    tx: mpsc::Sender<Arc<Frame>>,
    open: Arc<AtomicBool>,
}

/// Receiving half of a frame queue.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<Arc<Frame>>,
    open: Arc<AtomicBool>,
}

impl QueueSink {
    /// Create a queue holding at most `capacity` undelivered frames.
    #[must_use]
    pub fn channel(capacity: usize) -> (QueueSink, FrameReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let open = Arc::new(AtomicBool::new(true));
        (
            QueueSink {
                tx,
                open: Arc::clone(&open),
            },
            FrameReceiver { rx, open },
        )
    }

    /// Stop accepting frames.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Frames that can still be queued without waiting.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

#[async_trait]
impl EventSink for QueueSink {
    async fn send(&self, frame: Arc<Frame>) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.tx.send(frame).await.map_err(|_| SendError::Closed)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }
}

impl FrameReceiver {
    /// Wait for the next frame. Returns `None` once every sink is gone.
    pub async fn recv(&mut self) -> Option<Arc<Frame>> {
        self.rx.recv().await
    }

    /// Take the next frame if one is queued.
    pub fn try_recv(&mut self) -> Option<Arc<Frame>> {
        self.rx.try_recv().ok()
    }

    /// Take every queued frame.
    pub fn drain(&mut self) -> Vec<Arc<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Mark the queue closed; further sends fail with [`SendError::Closed`].
    pub fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{Attributes, EventContext, EventSelector, Hub};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_and_receive() {
        let (sink, mut rx) = QueueSink::channel(4);
        sink.send(Arc::new(Frame::ping())).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some(&Frame::ping()));
    }

    #[tokio::test]
    async fn test_closed_sink_rejects() {
        let (sink, mut rx) = QueueSink::channel(4);
        sink.close();
        assert!(!sink.is_open());
        assert_eq!(
            sink.send(Arc::new(Frame::ping())).await,
            Err(SendError::Closed)
        );
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_closes_sink() {
        let (sink, rx) = QueueSink::channel(4);
        drop(rx);
        assert!(!sink.is_open());
        assert_eq!(
            sink.send(Arc::new(Frame::ping())).await,
            Err(SendError::Closed)
        );
    }

    #[tokio::test]
    async fn test_receiver_close() {
        let (sink, mut rx) = QueueSink::channel(4);
        rx.close();
        assert_eq!(
            sink.send(Arc::new(Frame::ping())).await,
            Err(SendError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_times_out_in_dispatch() {
        let mut config = herald_core::HubConfig::default();
        config.dispatch.send_timeout = Duration::from_millis(20);
        let hub = Hub::with_config(config);
        hub.publish_app(
            EventSelector::All,
            |_: &herald_core::ServiceEvent, channels: &herald_core::ChannelStore| {
                channels.members("all")
            },
        );

        let (full, _full_rx) = QueueSink::channel(1);
        let (ok, mut ok_rx) = QueueSink::channel(8);
        let full_conn = hub.connect(Arc::new(full), Attributes::new());
        let ok_conn = hub.connect(Arc::new(ok), Attributes::new());
        hub.channels().join("all", &full_conn);
        hub.channels().join("all", &ok_conn);

        let messages = hub.service("messages").unwrap();
        messages.emit_created(json!({"n": 1}), EventContext::new()).await;
        let report = messages.emit_created(json!({"n": 2}), EventContext::new()).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(ok_rx.drain().len(), 2);
    }
}
