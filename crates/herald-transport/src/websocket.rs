//! WebSocket transport on top of axum.
//!
//! The HTTP layer performs the upgrade and hands the socket to [`serve`],
//! which registers the connection with the hub, writes queued frames to the
//! client and unregisters it when the socket ends.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use herald_core::{Attributes, ConnectionId, EventSink, Hub};
use herald_protocol::{codec, Encoding, Frame};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::queue::{FrameReceiver, QueueSink};

/// Error code sent when an inbound frame cannot be decoded.
pub const ERROR_INVALID_FRAME: u16 = 1000;

/// Error code sent for frames clients are not allowed to send.
pub const ERROR_UNEXPECTED_FRAME: u16 = 1001;

/// Per-socket settings.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Encoding of frames on this socket.
    pub encoding: Encoding,
    /// Frames buffered for the client before sends start to wait.
    pub outbound_buffer: usize,
    /// Heartbeat interval announced to the client.
    pub heartbeat_interval: Duration,
    /// Close the socket after this long without any inbound message.
    pub idle_timeout: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Json,
            outbound_buffer: 256,
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Drive a client socket until it closes.
///
/// The connection is registered with `attributes` before the `Connected`
/// frame is written and is always unregistered before this returns.
///
/// # Errors
///
/// Returns the reason the socket ended if it was not a clean close.
pub async fn serve(
    socket: WebSocket,
    hub: Arc<Hub>,
    attributes: Attributes,
    options: SocketOptions,
) -> Result<(), TransportError> {
    let (mut sender, mut receiver) = socket.split();
    let (sink, frames) = QueueSink::channel(options.outbound_buffer);

    let id = hub.connect(Arc::new(sink.clone()), attributes).id().clone();
    debug!(connection = %id, "WebSocket connected");

    let connected = Frame::connected(
        id.as_str(),
        options.heartbeat_interval.as_millis().min(u32::MAX as u128) as u32,
    );
    if let Err(e) = write_frame(&mut sender, &connected, options.encoding).await {
        hub.disconnect(&id);
        return Err(e);
    }

    let writer = tokio::spawn(write_loop(sender, frames, options.encoding, id.clone()));
    let result = read_loop(&mut receiver, &sink, &id, &options).await;

    sink.close();
    hub.disconnect(&id);
    writer.abort();

    debug!(connection = %id, "WebSocket disconnected");
    result
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut frames: FrameReceiver,
    encoding: Encoding,
    id: ConnectionId,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write_frame(&mut sender, &frame, encoding).await {
            debug!(connection = %id, error = %e, "Write failed, closing queue");
            break;
        }
    }
    frames.close();
    let _ = sender.close().await;
}

async fn read_loop(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    sink: &QueueSink,
    id: &ConnectionId,
    options: &SocketOptions,
) -> Result<(), TransportError> {
    loop {
        let message = match timeout(options.idle_timeout, receiver.next()).await {
            Err(_) => {
                debug!(connection = %id, "Idle timeout");
                return Err(TransportError::IdleTimeout);
            }
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return Err(TransportError::WebSocket(e.to_string())),
            Ok(Some(Ok(message))) => message,
        };

        let decoded = match message {
            Message::Text(text) => codec::decode(text.as_bytes(), Encoding::Json),
            Message::Binary(data) => codec::decode(&data, Encoding::MessagePack),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                debug!(connection = %id, "Received close frame");
                return Ok(());
            }
        };

        let reply = match decoded {
            Ok(Frame::Ping { timestamp }) => Frame::pong(timestamp),
            Ok(Frame::Pong { .. }) => continue,
            Ok(other) => {
                warn!(connection = %id, frame_type = ?other.frame_type(), "Unexpected frame type");
                Frame::error(ERROR_UNEXPECTED_FRAME, "unexpected frame")
            }
            Err(e) => {
                warn!(connection = %id, error = %e, "Invalid frame");
                Frame::error(ERROR_INVALID_FRAME, e.to_string())
            }
        };

        if sink.send(Arc::new(reply)).await.is_err() {
            return Err(TransportError::ConnectionClosed);
        }
    }
}

async fn write_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &Frame,
    encoding: Encoding,
) -> Result<(), TransportError> {
    let message = match encoding {
        Encoding::Json => Message::Text(codec::encode_text(frame)?),
        Encoding::MessagePack => Message::Binary(codec::encode(frame, encoding)?.to_vec()),
    };
    sender
        .send(message)
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_options_default() {
        let options = SocketOptions::default();
        assert_eq!(options.encoding, Encoding::Json);
        assert_eq!(options.outbound_buffer, 256);
        assert!(options.idle_timeout > options.heartbeat_interval);
    }
}
