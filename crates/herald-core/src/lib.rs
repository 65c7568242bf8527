//! # herald-core
//!
//! Broadcast core for Herald: decides which connected clients receive each
//! service event and delivers it to them.
//!
//! - **Registry** - Live connections and their attributes
//! - **Channel** - Named sets of connections
//! - **Publisher** - Per-service filters mapping an event to an audience
//! - **Dispatcher** - Bounded, failure-isolated fan-out
//! - **EventSource** - What services call after a mutation
//! - **Hub** - Owns all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ EventSource │────▶│ Dispatcher  │────▶│  Publisher  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │ Connection  │◀────│  Channels   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let hub = Hub::new();
//! hub.on_connection(|hub, conn| {
//!     hub.channels().join("everyone", conn);
//! });
//! hub.publish_app(EventSelector::All, |_: &ServiceEvent, channels: &ChannelStore| {
//!     channels.members("everyone")
//! });
//!
//! let messages = hub.service("messages")?;
//! messages.emit_created(json!({"text": "hi"}), EventContext::new()).await;
//! ```

pub mod audience;
pub mod channel;
pub mod connection;
pub mod dispatcher;
pub mod event;
pub mod hub;
pub mod publisher;
pub mod registry;
pub mod source;

#[cfg(test)]
mod testing;

pub use audience::{Audience, Recipient};
pub use channel::{Channel, ChannelConfig, ChannelStats, ChannelStore};
pub use connection::{Attributes, Connection, ConnectionId, EventSink, SendError};
pub use dispatcher::{DispatchConfig, DispatchReport, DispatchStats, Dispatcher};
pub use event::{EventContext, EventError, EventKind, ServiceEvent};
pub use hub::{Hub, HubConfig, HubStats};
pub use publisher::{EventSelector, Publisher, PublisherTable, Scope};
pub use registry::ConnectionRegistry;
pub use source::EventSource;
