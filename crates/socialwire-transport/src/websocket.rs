//! Client side of the event socket over tokio-tungstenite.
//!
//! Reads happen on the caller's task; writes go through a per-connection
//! writer task so that [`Connection::send`] never blocks.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use socialwire_protocol::MAX_FRAME_SIZE;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, COOKIE};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::endpoint::Endpoint;
use crate::traits::{Connection, ConnectionId, Connector, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake and read limits for [`WebSocketConnector`].
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum inbound message size in bytes; larger messages are dropped.
    pub max_message_size: usize,
    /// Session cookie sent with the opening handshake.
    pub session_cookie: Option<String>,
    /// Limit on TCP connect plus handshake.
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_FRAME_SIZE,
            session_cookie: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Opens WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Create a connector with the given configuration.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let mut request = endpoint
            .url()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        if let Some(cookie) = &self.config.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| TransportError::Other(format!("Invalid session cookie: {e}")))?;
            request.headers_mut().insert(COOKIE, value);
        }

        debug!(endpoint = %endpoint, "Opening WebSocket");

        let (stream, _response) =
            match tokio::time::timeout(self.config.connect_timeout, connect_async(request)).await {
                Ok(Ok(connected)) => connected,
                Ok(Err(WsError::Io(e))) => return Err(TransportError::Io(e)),
                Ok(Err(e)) => return Err(TransportError::Handshake(e.to_string())),
                Err(_) => return Err(TransportError::Timeout),
            };

        let conn = WebSocketConnection::new(stream, self.config.max_message_size);
        info!(connection = %conn.id, endpoint = %endpoint, "WebSocket connected");
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A client WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    reader: SplitStream<WsStream>,
    writer: mpsc::UnboundedSender<Message>,
    writer_task: Option<JoinHandle<()>>,
    is_open: Arc<AtomicBool>,
    max_message_size: usize,
}

impl WebSocketConnection {
    fn new(stream: WsStream, max_message_size: usize) -> Self {
        let id = ConnectionId::next();
        let (sink, reader) = stream.split();
        let (writer, outbound) = mpsc::unbounded_channel();
        let is_open = Arc::new(AtomicBool::new(true));

        let writer_task = tokio::spawn(write_loop(id, sink, outbound, Arc::clone(&is_open)));

        Self {
            id,
            reader,
            writer,
            writer_task: Some(writer_task),
            is_open,
            max_message_size,
        }
    }

    fn mark_closed(&self) {
        self.is_open.store(false, Ordering::SeqCst);
    }
}

async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    is_open: Arc<AtomicBool>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            warn!(connection = %id, error = %e, "WebSocket write failed");
            break;
        }
        if closing {
            break;
        }
    }
    is_open.store(false, Ordering::SeqCst);
    debug!(connection = %id, "WebSocket writer stopped");
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > self.max_message_size {
                        warn!(
                            connection = %self.id,
                            size = text.len(),
                            max = self.max_message_size,
                            "Dropping oversized text message"
                        );
                        continue;
                    }
                    return Ok(Some(text));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) if text.len() <= self.max_message_size => return Ok(Some(text)),
                    Ok(text) => {
                        warn!(connection = %self.id, size = text.len(), "Binary message too large");
                    }
                    Err(_) => {
                        warn!(connection = %self.id, "Dropping non-UTF-8 binary message");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    if self.writer.send(Message::Pong(data)).is_err() {
                        warn!(connection = %self.id, "Failed to send pong");
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    // Ignore pong messages
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
                    self.mark_closed();
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => {
                    // Raw frame, ignore
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    debug!(connection = %self.id, "Connection closed");
                    self.mark_closed();
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(connection = %self.id, "WebSocket error: {}", e);
                    self.mark_closed();
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.mark_closed();
                    return Ok(None);
                }
            }
        }
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }

        self.writer
            .send(Message::Text(text))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        // The writer stops after forwarding the close frame.
        let _ = self.writer.send(Message::Close(None));
        if let Some(task) = self.writer_task.take() {
            task.await
                .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}
