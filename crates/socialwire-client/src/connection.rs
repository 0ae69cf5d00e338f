//! The connection manager task.
//!
//! One task owns the socket, the pending-call table, the outbound queue and
//! the event router. Client handles talk to it only through [`Command`]s, so
//! every state change happens in one place and in arrival order.
//!
//! ```text
//!  Disconnected ──▶ Connecting ──▶ Connected
//!       ▲               │              │
//!       └── backoff ◀───┴──────────────┘
//! ```

use serde_json::Value;
use socialwire_core::{
    CallError, ConnectionState, EventRouter, OutboundQueue, PendingCallTable, QueuedSend,
    ReplyCallback, Routed, Subscriber,
};
use socialwire_protocol::{codec, CodecError, EventKind, RequestType};
use socialwire_transport::{Connection, Connector, Endpoint, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{Backoff, ClientConfig};
use crate::metrics::{self, ConnectionMetricsGuard};

/// Shortest interval between request timeout sweeps.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// Requests from client handles to the manager task.
pub(crate) enum Command {
    Send {
        request_type: RequestType,
        payload: Value,
        callback: ReplyCallback,
    },
    Subscribe {
        kinds: Vec<EventKind>,
        subscriber: Box<dyn Subscriber>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Why [`ConnectionManager::serve`] returned.
enum Closed {
    Lost(String),
    Shutdown,
}

enum TransmitError {
    Encode(CodecError),
    Transport(TransportError),
}

/// Owns the connection lifecycle.
pub(crate) struct ConnectionManager {
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    config: ClientConfig,
    state: watch::Sender<ConnectionState>,
    pending: PendingCallTable,
    queue: OutboundQueue,
    router: EventRouter,
    commands: mpsc::UnboundedReceiver<Command>,
    backoff: Backoff,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ConnectionManager {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        endpoint: Endpoint,
        config: ClientConfig,
        router: EventRouter,
        state: watch::Sender<ConnectionState>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            connector,
            endpoint,
            queue: OutboundQueue::with_capacity(config.queue_capacity),
            backoff: Backoff::new(config.reconnect.clone()),
            config,
            state,
            pending: PendingCallTable::new(),
            router,
            commands,
            shutdown: None,
        }
    }

    /// Run until shutdown or until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        info!(
            endpoint = %self.endpoint,
            transport = self.connector.name(),
            "Connection manager started"
        );

        while let Some(mut conn) = self.connect().await {
            self.on_open(conn.as_mut());

            match self.serve(conn.as_mut()).await {
                Closed::Lost(reason) => {
                    self.on_close(&reason);
                    if !self.wait_reconnect().await {
                        break;
                    }
                }
                Closed::Shutdown => {
                    if let Err(e) = conn.close().await {
                        debug!(error = %e, "Close during shutdown failed");
                    }
                    break;
                }
            }
        }

        self.finish();
    }

    /// Connect, retrying with backoff. `None` means shut down instead.
    async fn connect(&mut self) -> Option<Box<dyn Connection>> {
        loop {
            self.set_state(ConnectionState::Connecting);
            metrics::record_connect_attempt();

            let connector = Arc::clone(&self.connector);
            let endpoint = self.endpoint.clone();
            let attempt = async move { connector.connect(&endpoint).await };
            tokio::pin!(attempt);

            let result = loop {
                tokio::select! {
                    result = &mut attempt => break result,
                    command = self.commands.recv() => {
                        if !self.handle_command(command, None) {
                            return None;
                        }
                    }
                }
            };

            match result {
                Ok(conn) => return Some(conn),
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "Connection attempt failed");
                    self.set_state(ConnectionState::Disconnected);
                    if !self.wait_reconnect().await {
                        return None;
                    }
                }
            }
        }
    }

    /// Enter `Connected`: flush everything queued while offline, in order.
    fn on_open(&mut self, conn: &mut dyn Connection) {
        self.set_state(ConnectionState::Connected);
        self.backoff.reset();

        let pending = &mut self.pending;
        let flushed = self.queue.flush(|send| match transmit(pending, conn, send) {
            Ok(()) => Ok(()),
            Err(TransmitError::Encode(e)) => {
                warn!(correlation_id = send.correlation_id, error = %e, "Dropping unencodable send");
                pending.reject(send.correlation_id, CallError::Encode(e.to_string()));
                Ok(())
            }
            Err(TransmitError::Transport(e)) => Err(e),
        });

        match flushed {
            Ok(0) => {}
            Ok(sent) => info!(connection = %conn.id(), sent, "Flushed outbound queue"),
            Err(e) => warn!(
                connection = %conn.id(),
                error = %e,
                remaining = self.queue.len(),
                "Flush interrupted"
            ),
        }
        metrics::set_queue_depth(self.queue.len());
    }

    async fn serve(&mut self, conn: &mut dyn Connection) -> Closed {
        let _metrics_guard = ConnectionMetricsGuard::new();
        let mut sweep = self.config.request_timeout.map(|timeout| {
            let mut interval = tokio::time::interval((timeout / 4).max(MIN_SWEEP_INTERVAL));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    if !self.handle_command(command, Some(&mut *conn)) {
                        return Closed::Shutdown;
                    }
                }

                frame = conn.recv() => match frame {
                    Ok(Some(text)) => self.on_frame(&text),
                    Ok(None) => return Closed::Lost("connection closed".to_string()),
                    Err(e) => return Closed::Lost(e.to_string()),
                },

                () = sweep_tick(&mut sweep) => self.sweep(),
            }
        }
    }

    /// Enter `Disconnected` after losing the socket.
    fn on_close(&mut self, reason: &str) {
        self.set_state(ConnectionState::Disconnected);

        let rejected = self.pending.drain_all(reason);
        metrics::record_calls_rejected("transport", rejected);
        metrics::set_pending_calls(self.pending.len());

        self.router.connection_reset();
        info!(reason, rejected, queued = self.queue.len(), "Connection lost");
    }

    /// Sleep out the backoff delay while still accepting commands.
    async fn wait_reconnect(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Waiting to reconnect");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return true,
                command = self.commands.recv() => {
                    if !self.handle_command(command, None) {
                        return false;
                    }
                }
            }
        }
    }

    /// Apply one command. Returns `false` when the manager should stop.
    fn handle_command(&mut self, command: Option<Command>, conn: Option<&mut dyn Connection>) -> bool {
        match command {
            Some(Command::Send {
                request_type,
                payload,
                callback,
            }) => {
                self.send(request_type, payload, callback, conn);
                true
            }
            Some(Command::Subscribe { kinds, subscriber }) => {
                self.router.subscribe(kinds, subscriber);
                true
            }
            Some(Command::Shutdown { done }) => {
                self.shutdown = Some(done);
                false
            }
            None => {
                debug!("All client handles dropped");
                false
            }
        }
    }

    fn send(
        &mut self,
        request_type: RequestType,
        payload: Value,
        callback: ReplyCallback,
        conn: Option<&mut dyn Connection>,
    ) {
        let correlation_id = self.pending.issue(request_type, callback);
        let send = QueuedSend::new(request_type, correlation_id, payload);

        let unsent = match conn {
            Some(conn) if self.state.borrow().is_connected() => {
                match transmit(&mut self.pending, conn, &send) {
                    Ok(()) => None,
                    Err(TransmitError::Encode(e)) => {
                        warn!(correlation_id, error = %e, "Request could not be encoded");
                        self.pending
                            .reject(correlation_id, CallError::Encode(e.to_string()));
                        None
                    }
                    // The read side reports the closure; keep the send for the next connection.
                    Err(TransmitError::Transport(e)) => {
                        debug!(correlation_id, error = %e, "Write failed, queueing");
                        Some(send)
                    }
                }
            }
            _ => Some(send),
        };

        if let Some(send) = unsent {
            if let Err(full) = self.queue.enqueue(send) {
                warn!(correlation_id, capacity = full.capacity, "Outbound queue full");
                self.pending
                    .reject(correlation_id, CallError::QueueFull(full.capacity));
                metrics::record_calls_rejected("queue_full", 1);
            }
            metrics::set_queue_depth(self.queue.len());
        }
        metrics::set_pending_calls(self.pending.len());
    }

    fn on_frame(&mut self, text: &str) {
        metrics::record_frame(text.len(), "inbound");

        let message = match codec::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, size = text.len(), "Discarding malformed frame");
                metrics::record_decode_error();
                return;
            }
        };

        match self.router.route(message, &mut self.pending) {
            Routed::Orphan(_) => metrics::record_orphan_reply(),
            Routed::ServerError { .. } => metrics::record_server_error(),
            Routed::UnknownEvent(_) => metrics::record_unknown_event(),
            Routed::Resolved(_) | Routed::Delivered { .. } => {}
        }
        metrics::set_pending_calls(self.pending.len());
    }

    fn sweep(&mut self) {
        let Some(timeout) = self.config.request_timeout else {
            return;
        };

        let expired = self.pending.expire(Instant::now(), timeout);
        if expired > 0 {
            warn!(expired, timeout_ms = timeout.as_millis() as u64, "Requests timed out");
            metrics::record_calls_rejected("timeout", expired);
            metrics::set_pending_calls(self.pending.len());
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let current = *self.state.borrow();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "Unexpected state transition");
        }
        self.state.send_replace(next);
        debug!(from = %current, to = %next, "Connection state changed");
    }

    fn finish(mut self) {
        self.set_state(ConnectionState::Disconnected);

        let rejected = self.pending.reject_all(&CallError::Shutdown);
        metrics::record_calls_rejected("shutdown", rejected);
        metrics::set_pending_calls(0);
        metrics::set_queue_depth(0);
        info!(rejected, "Connection manager stopped");

        if let Some(done) = self.shutdown.take() {
            let _ = done.send(());
        }
    }
}

/// Encode and write one send, marking its call in flight.
fn transmit(
    pending: &mut PendingCallTable,
    conn: &mut dyn Connection,
    send: &QueuedSend,
) -> Result<(), TransmitError> {
    let frame = codec::encode(send.request_type, send.correlation_id, &send.payload)
        .map_err(TransmitError::Encode)?;
    let size = frame.len();

    conn.send(frame).map_err(TransmitError::Transport)?;
    pending.mark_transmitted(send.correlation_id);
    metrics::record_frame(size, "outbound");
    Ok(())
}

async fn sweep_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
