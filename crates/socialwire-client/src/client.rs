//! The client handle.

use serde::Serialize;
use serde_json::Value;
use socialwire_core::{
    CallError, ConnectionState, EventRouter, PresenceEntry, RouterConfig, ServerError, Subscriber,
    PRESENCE_KINDS,
};
use socialwire_protocol::{Event, EventKind, Request, RequestType};
use socialwire_transport::{Connector, Endpoint};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::connection::{Command, ConnectionManager};
use crate::presence::PresenceFeed;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection manager has stopped.
    #[error("Client is shut down")]
    Closed,

    /// Request payloads must serialize to JSON objects.
    #[error("Request payload must be a JSON object")]
    PayloadNotObject,

    /// The call completed without a usable reply.
    #[error(transparent)]
    Call(#[from] CallError),

    /// The payload could not be serialized.
    #[error("Payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Handle to a running connection manager.
///
/// Cheap to clone. The manager stops when [`shutdown`](Self::shutdown) is
/// called or the last handle is dropped.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    presence: watch::Receiver<Vec<PresenceEntry>>,
    errors: broadcast::Sender<ServerError>,
}

impl Client {
    /// Spawn a connection manager for `endpoint` and return its handle.
    ///
    /// Must be called from within a tokio runtime. The manager connects
    /// immediately and keeps reconnecting until shut down.
    pub fn start<C>(connector: C, endpoint: Endpoint, config: ClientConfig) -> (Self, JoinHandle<()>)
    where
        C: Connector + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (presence_tx, presence_rx) = watch::channel(Vec::new());

        let mut router = EventRouter::with_config(RouterConfig {
            error_capacity: config.error_capacity,
        });
        let errors = router.error_sink();
        router.subscribe(PRESENCE_KINDS, Box::new(PresenceFeed::new(presence_tx)));

        let manager = ConnectionManager::new(
            Arc::new(connector),
            endpoint,
            config,
            router,
            state_tx,
            commands_rx,
        );
        let task = tokio::spawn(manager.run());

        let client = Self {
            commands: commands_tx,
            state: state_rx,
            presence: presence_rx,
            errors,
        };
        (client, task)
    }

    /// Issue a request; `callback` gets the reply payload or the failure.
    ///
    /// Written immediately while connected, queued otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object or the client is
    /// shut down. The callback is not invoked in that case.
    pub fn send<P, F>(&self, request_type: RequestType, payload: &P, callback: F) -> Result<(), ClientError>
    where
        P: Serialize + ?Sized,
        F: FnOnce(Result<Value, CallError>) + Send + 'static,
    {
        let payload = serde_json::to_value(payload)?;
        if !payload.is_object() {
            return Err(ClientError::PayloadNotObject);
        }

        self.commands
            .send(Command::Send {
                request_type,
                payload,
                callback: Box::new(callback),
            })
            .map_err(|_| ClientError::Closed)
    }

    /// Issue a request and wait for the reply payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or completes without a
    /// reply. A server error for the call yields [`CallError::Discarded`].
    pub async fn call<P>(&self, request_type: RequestType, payload: &P) -> Result<Value, ClientError>
    where
        P: Serialize + ?Sized,
    {
        let (tx, rx) = oneshot::channel();
        self.send(request_type, payload, move |result| {
            let _ = tx.send(result);
        })?;

        match rx.await {
            Ok(result) => Ok(result?),
            // Dropped without invocation.
            Err(_) => Err(ClientError::Call(CallError::Discarded)),
        }
    }

    /// Issue a typed request and decode its reply.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus [`CallError::InvalidReply`] if the reply
    /// does not match `R::Reply`.
    pub async fn request<R: Request>(&self, request: &R) -> Result<R::Reply, ClientError> {
        let reply = self.call(R::TYPE, request).await?;
        serde_json::from_value(reply)
            .map_err(|e| ClientError::Call(CallError::InvalidReply(e.to_string())))
    }

    /// Receive every event of `kind`. Drop the receiver to unsubscribe.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is shut down.
    pub fn subscribe(&self, kind: EventKind) -> Result<mpsc::UnboundedReceiver<Event>, ClientError> {
        self.subscribe_kinds([kind])
    }

    /// Receive every event of any of `kinds` on one channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is shut down.
    pub fn subscribe_kinds(
        &self,
        kinds: impl IntoIterator<Item = EventKind>,
    ) -> Result<mpsc::UnboundedReceiver<Event>, ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe_with(kinds, tx)?;
        Ok(rx)
    }

    /// Register a custom subscriber, run on the manager task.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is shut down.
    pub fn subscribe_with<S>(&self, kinds: impl IntoIterator<Item = EventKind>, subscriber: S) -> Result<(), ClientError>
    where
        S: Subscriber + 'static,
    {
        self.commands
            .send(Command::Subscribe {
                kinds: kinds.into_iter().collect(),
                subscriber: Box::new(subscriber),
            })
            .map_err(|_| ClientError::Closed)
    }

    /// Receive server-reported protocol errors.
    #[must_use]
    pub fn errors(&self) -> broadcast::Receiver<ServerError> {
        self.errors.subscribe()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the connection reaches `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager stops first.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), ClientError> {
        let mut rx = self.state.clone();
        rx.wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    /// Watch the online user list.
    #[must_use]
    pub fn presence(&self) -> watch::Receiver<Vec<PresenceEntry>> {
        self.presence.clone()
    }

    /// Users currently online, sorted by id.
    #[must_use]
    pub fn online_users(&self) -> Vec<PresenceEntry> {
        self.presence.borrow().clone()
    }

    /// Stop the manager: close the socket and reject every pending call
    /// with [`CallError::Shutdown`].
    pub async fn shutdown(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).is_ok() {
            let _ = finished.await;
        }
    }
}
