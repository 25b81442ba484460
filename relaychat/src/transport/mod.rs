//! Transport layer abstraction.
//!
//! The chat server speaks two frame kinds over one connection: JSON text
//! frames for broadcast chat and registration, and binary frames carrying
//! encrypted private envelopes. The transport only moves frames; it never
//! interprets them.
//!
//! Implementations:
//! - [`websocket::WebSocketTransport`]: the real chat server connection
//! - [`loopback::LoopbackTransport`]: in-process pair for tests

pub mod loopback;
pub mod websocket;

use std::future::Future;

/// One unit received from or sent to the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Broadcast/registration JSON.
    Text(String),
    /// Encoded private envelope.
    Binary(Vec<u8>),
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has been closed by either side.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connecting took longer than the configured timeout.
    #[error("transport operation timed out")]
    Timeout,

    /// The server address could not be reached.
    #[error("server {0} is unreachable")]
    Unreachable(String),

    /// The server address does not form a valid URL.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async connection to the chat server.
pub trait Transport: Send + Sync + 'static {
    /// Send a text (broadcast/registration) frame.
    fn send_text(&self, text: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send a binary (private envelope) frame.
    fn send_binary(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next frame. Returns [`TransportError::ConnectionClosed`]
    /// once the connection is gone.
    fn recv(&self) -> impl Future<Output = Result<Frame, TransportError>> + Send;

    /// Returns `true` while the connection is usable.
    fn is_connected(&self) -> bool;

    /// Close the connection. Idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
