//! Transport abstraction traits.
//!
//! The connection manager only sees these traits, so the same state machine
//! runs over a real WebSocket or an in-memory pair in tests.

use crate::endpoint::Endpoint;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Process-unique id of one opened connection, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is no longer writable.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Connect plus handshake took too long.
    #[error("Connect timed out")]
    Timeout,

    /// The socket failed while reading.
    #[error("Read failed: {0}")]
    ReceiveFailed(String),

    /// The opening handshake was refused or failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The endpoint URL cannot be used.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Connecting failed at the socket level.
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Opens connections to a server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection, completing the handshake.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError>;

    /// Short transport name for logs.
    fn name(&self) -> &'static str;
}

/// An open connection carrying text frames.
#[async_trait]
pub trait Connection: Send {
    fn id(&self) -> ConnectionId;

    /// Receive the next text frame, skipping control traffic.
    ///
    /// `Ok(None)` means the peer closed the socket.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Queue a text frame for writing.
    ///
    /// Does not wait for the write to complete; a failure surfaces either
    /// here or as the connection closing.
    fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a close frame and wait for pending writes.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// `false` once either side has closed the socket.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_increase() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert!(second > first);
        assert_eq!(first.to_string(), format!("conn-{}", first.get()));
    }
}
