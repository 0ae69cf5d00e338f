//! In-memory transport.
//!
//! [`memory_transport`] returns a connector and a listener joined by channels.
//! Each successful connect hands the listener a [`MemoryPeer`] that plays the
//! server side of that connection. Used to drive the connection manager in
//! tests without sockets.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::traits::{Connection, ConnectionId, Connector, TransportError};

/// Create a connected connector/listener pair.
#[must_use]
pub fn memory_transport() -> (MemoryConnector, MemoryListener) {
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    let connector = MemoryConnector {
        accepted: accepted_tx,
        refuse: Arc::new(AtomicUsize::new(0)),
        attempts: Arc::new(AtomicUsize::new(0)),
    };
    let listener = MemoryListener {
        accepted: accepted_rx,
    };
    (connector, listener)
}

/// Client half of the in-memory transport.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Fail the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Number of connection attempts so far, refused ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Handshake("connection refused".to_string()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let id = ConnectionId::next();

        let peer = MemoryPeer {
            connection_id: id,
            endpoint: endpoint.clone(),
            incoming: from_client,
            outgoing: Some(to_client),
        };
        self.accepted
            .send(peer)
            .map_err(|_| TransportError::Handshake("listener dropped".to_string()))?;

        debug!(connection = %id, endpoint = %endpoint, "Memory connection opened");
        Ok(Box::new(MemoryConnection {
            id,
            incoming: from_server,
            outgoing: Some(to_server),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Receives the server side of every accepted connection.
#[derive(Debug)]
pub struct MemoryListener {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next connection. `None` once the connector is gone.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }
}

/// Server side of one in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    connection_id: ConnectionId,
    endpoint: Endpoint,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

impl MemoryPeer {
    /// Push a frame to the client. Returns `false` if the client is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.outgoing
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Next frame written by the client; `None` once it closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Frame already written by the client, if any.
    pub fn try_recv(&mut self) -> Option<String> {
        self.incoming.try_recv().ok()
    }

    /// Drop the connection from the server side.
    pub fn close(&mut self) {
        self.outgoing = None;
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// The endpoint the client connected to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// Client side of one in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        let frame = self.incoming.recv().await;
        if frame.is_none() {
            self.outgoing = None;
        }
        Ok(frame)
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self
            .outgoing
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        tx.send(text).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outgoing = None;
        self.incoming.close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.outgoing.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}
