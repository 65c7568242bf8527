//! # herald-transport
//!
//! Transport sinks for the Herald broadcaster.
//!
//! - **Queue** - Bounded in-memory sink, the building block of every transport
//! - **WebSocket** - Drives an axum WebSocket against a [`herald_core::Hub`]
//!
//! ```rust,ignore
//! use herald_transport::websocket::{serve, SocketOptions};
//!
//! ws.on_upgrade(move |socket| async move {
//!     let _ = serve(socket, hub, attributes, SocketOptions::default()).await;
//! })
//! ```

pub mod error;
pub mod queue;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::TransportError;
pub use queue::{FrameReceiver, QueueSink};

#[cfg(feature = "websocket")]
pub use websocket::{serve, SocketOptions};
