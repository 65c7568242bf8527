//! Frame types for the Herald protocol.
//!
//! Frames are what a connected client sees on the wire. The server pushes
//! `Connected` once after the handshake and then one `Event` frame per
//! service event the client is in the audience of.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current protocol version, announced in the `Connected` frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Event = 0x01,
    Error = 0x02,
    Ping = 0x03,
    Pong = 0x04,
    Connected = 0x05,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::Event),
            0x02 => Ok(FrameType::Error),
            0x03 => Ok(FrameType::Ping),
            0x04 => Ok(FrameType::Pong),
            0x05 => Ok(FrameType::Connected),
            _ => Err("Invalid frame type"),
        }
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// A service event pushed to the client.
    #[serde(rename = "event")]
    Event {
        /// Event name in the form `"<service> <event>"`, e.g. `"messages created"`.
        event: String,
        /// Event payload.
        payload: Value,
    },

    /// Error notice.
    #[serde(rename = "error")]
    Error {
        /// Error code.
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Timestamp echoed from the ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Sent once after the connection has been registered.
    #[serde(rename = "connected")]
    Connected {
        /// Identifier assigned to this connection.
        connection_id: String,
        /// Protocol version.
        version: u8,
        /// Expected client heartbeat interval in milliseconds.
        heartbeat: u32,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Event { .. } => FrameType::Event,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connected { .. } => FrameType::Connected,
        }
    }

    /// Create a new Event frame.
    #[must_use]
    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        Frame::Event {
            event: event.into(),
            payload,
        }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connected frame for the current protocol version.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version: PROTOCOL_VERSION,
            heartbeat,
        }
    }

    /// The event name, if this is an Event frame.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Frame::Event { event, .. } => Some(event),
            _ => None,
        }
    }

    /// The payload, if this is an Event frame.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Frame::Event { payload, .. } => Some(payload),
            _ => None,
        }
    }
}
