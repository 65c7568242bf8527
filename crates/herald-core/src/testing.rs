//! Test sinks shared by the unit tests of this crate.

use crate::connection::{EventSink, SendError};
use async_trait::async_trait;
use herald_protocol::Frame;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    Record,
    Fail,
    Stall,
    Panic,
}

/// A sink that records every frame it is given.
pub(crate) struct RecordingSink {
    frames: Mutex<Vec<Arc<Frame>>>,
    open: AtomicBool,
    behavior: Behavior,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_behavior(Behavior::Record)
    }

    pub(crate) fn with_behavior(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            behavior,
        })
    }

    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub(crate) fn frames(&self) -> Vec<Arc<Frame>> {
        self.frames.lock().unwrap().clone()
    }

    /// `(event name, payload)` of every recorded event frame.
    pub(crate) fn events(&self) -> Vec<(String, Value)> {
        self.frames()
            .iter()
            .filter_map(|f| Some((f.event_name()?.to_owned(), f.payload()?.clone())))
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, frame: Arc<Frame>) -> Result<(), SendError> {
        match self.behavior {
            Behavior::Record => {
                self.frames.lock().unwrap().push(frame);
                Ok(())
            }
            Behavior::Fail => Err(SendError::Failed("boom".into())),
            Behavior::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            Behavior::Panic => panic!("sink panicked"),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
