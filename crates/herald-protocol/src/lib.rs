//! # herald-protocol
//!
//! Wire protocol definitions for the Herald event broadcaster.
//!
//! The broadcast core hands each recipient a [`Frame`]; how it is put on the
//! wire is decided by the transport through an [`Encoding`].
//!
//! ## Frame Types
//!
//! - `Event` - A service event, named `"<service> <event>"`
//! - `Connected` - Sent once after the connection is registered
//! - `Ping` / `Pong` - Keepalive
//! - `Error` - Error notices
//!
//! ## Example
//!
//! ```rust
//! use herald_protocol::{codec, Encoding, Frame};
//! use serde_json::json;
//!
//! let frame = Frame::event("messages created", json!({"text": "Hello"}));
//!
//! let encoded = codec::encode(&frame, Encoding::MessagePack).unwrap();
//! let decoded = codec::decode(&encoded, Encoding::MessagePack).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, Encoding, ProtocolError};
pub use frames::{Frame, FrameType, PROTOCOL_VERSION};
