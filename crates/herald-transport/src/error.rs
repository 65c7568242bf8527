//! Transport errors.

use thiserror::Error;

/// Errors raised while driving a client connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The client sent nothing for longer than the idle timeout.
    #[error("Connection idle for too long")]
    IdleTimeout,

    /// Frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] herald_protocol::ProtocolError),

    /// The WebSocket failed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}
