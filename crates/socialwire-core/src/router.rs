//! Inbound message router.
//!
//! Every decoded frame goes through [`EventRouter::route`], which resolves
//! pending calls, fans events out to subscribers, and publishes server errors
//! on the shared error sink.

use crate::pending::PendingCallTable;
use socialwire_protocol::{CorrelationId, Event, EventKind, WireMessage};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

/// Handle returned by [`EventRouter::subscribe`].
pub type SubscriptionId = u64;

/// Receives events of the kinds it subscribed to.
pub trait Subscriber: Send {
    /// Handle one event.
    fn handle(&mut self, event: &Event);

    /// Drop per-connection state. Called every time the socket closes.
    fn reset(&mut self) {}

    /// Whether the subscriber can be pruned.
    fn is_closed(&self) -> bool {
        false
    }
}

impl Subscriber for mpsc::UnboundedSender<Event> {
    fn handle(&mut self, event: &Event) {
        let _ = self.send(event.clone());
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

/// Adapts a closure into a [`Subscriber`].
pub struct FnSubscriber<F>(pub F);

impl<F> Subscriber for FnSubscriber<F>
where
    F: FnMut(&Event) + Send,
{
    fn handle(&mut self, event: &Event) {
        (self.0)(event);
    }
}

/// A protocol error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Server error{}: {message}", .correlation_id.map(|id| format!(" for call {id}")).unwrap_or_default())]
pub struct ServerError {
    /// The failed call, when the server named one.
    pub correlation_id: Option<CorrelationId>,
    /// Human-readable message.
    pub message: String,
}

/// What [`EventRouter::route`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// A pending call received its reply.
    Resolved(CorrelationId),
    /// A reply matched no pending call and was dropped.
    Orphan(CorrelationId),
    /// An event reached this many subscribers.
    Delivered { kind: EventKind, subscribers: usize },
    /// An `EVENT_*` tag outside the catalog; dropped.
    UnknownEvent(String),
    /// A server error went to the error sink.
    ServerError {
        correlation_id: Option<CorrelationId>,
        /// Whether a pending call was dropped without invocation.
        discarded_call: bool,
    },
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Capacity of the server error broadcast channel.
    pub error_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { error_capacity: 64 }
    }
}

struct Subscription {
    id: SubscriptionId,
    kinds: Vec<EventKind>,
    subscriber: Box<dyn Subscriber>,
}

/// Dispatches inbound messages.
pub struct EventRouter {
    subscriptions: Vec<Subscription>,
    next_subscription: SubscriptionId,
    errors: broadcast::Sender<ServerError>,
}

impl EventRouter {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating event router with config: {:?}", config);
        let (errors, _) = broadcast::channel(config.error_capacity.max(1));
        Self {
            subscriptions: Vec::new(),
            next_subscription: 1,
            errors,
        }
    }

    /// Register `subscriber` for the given event kinds.
    pub fn subscribe(
        &mut self,
        kinds: impl IntoIterator<Item = EventKind>,
        subscriber: Box<dyn Subscriber>,
    ) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;

        let kinds: Vec<_> = kinds.into_iter().collect();
        debug!(subscription = id, kinds = ?kinds, "Subscribed");
        self.subscriptions.push(Subscription {
            id,
            kinds,
            subscriber,
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        let removed = self.subscriptions.len() != before;
        if removed {
            debug!(subscription = id, "Unsubscribed");
        }
        removed
    }

    /// Route one inbound message.
    pub fn route(&mut self, message: WireMessage, pending: &mut PendingCallTable) -> Routed {
        match message {
            WireMessage::Reply {
                correlation_id,
                reply_type,
                payload,
            } => {
                if pending.resolve(correlation_id, payload) {
                    Routed::Resolved(correlation_id)
                } else {
                    warn!(correlation_id, %reply_type, "Dropping orphan reply");
                    Routed::Orphan(correlation_id)
                }
            }

            WireMessage::ProtocolError {
                correlation_id,
                message,
            } => {
                let discarded_call = correlation_id.is_some_and(|id| pending.discard(id));
                warn!(?correlation_id, discarded_call, %message, "Server reported an error");

                let error = ServerError {
                    correlation_id,
                    message,
                };
                if self.errors.send(error).is_err() {
                    trace!("No error sink listeners");
                }

                Routed::ServerError {
                    correlation_id,
                    discarded_call,
                }
            }

            WireMessage::Event(event) => self.dispatch(&event),
        }
    }

    fn dispatch(&mut self, event: &Event) -> Routed {
        if let EventKind::Unknown(tag) = &event.kind {
            warn!(tag = %tag, "Dropping unknown event");
            return Routed::UnknownEvent(tag.clone());
        }

        self.subscriptions.retain(|s| {
            let closed = s.subscriber.is_closed();
            if closed {
                debug!(subscription = s.id, "Pruning closed subscriber");
            }
            !closed
        });

        let mut subscribers = 0;
        for subscription in &mut self.subscriptions {
            if subscription.kinds.contains(&event.kind) {
                subscription.subscriber.handle(event);
                subscribers += 1;
            }
        }

        trace!(kind = %event.kind, subscribers, "Dispatched event");
        Routed::Delivered {
            kind: event.kind.clone(),
            subscribers,
        }
    }

    /// Tell every subscriber that the connection closed.
    pub fn connection_reset(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.subscriber.reset();
        }
    }

    /// Subscribe to server errors.
    #[must_use]
    pub fn errors(&self) -> broadcast::Receiver<ServerError> {
        self.errors.subscribe()
    }

    /// The sending half of the error sink, for handles that subscribe later.
    #[must_use]
    pub fn error_sink(&self) -> broadcast::Sender<ServerError> {
        self.errors.clone()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::{CallError, ReplyCallback};
    use serde_json::{json, Value};
    use socialwire_protocol::RequestType;
    use std::sync::{Arc, Mutex};

    fn recorder(outcomes: &Arc<Mutex<Vec<Result<Value, CallError>>>>) -> ReplyCallback {
        let outcomes = Arc::clone(outcomes);
        Box::new(move |result| outcomes.lock().unwrap().push(result))
    }

    fn event(kind: EventKind) -> WireMessage {
        WireMessage::Event(Event::new(kind.clone(), json!({"Type": kind.as_str()})))
    }

    #[test]
    fn test_route_reply_then_duplicate() {
        let mut router = EventRouter::new();
        let mut pending = PendingCallTable::new();
        let outcomes = Arc::default();

        let id = pending.issue(RequestType::GetFriends, recorder(&outcomes));
        let reply = WireMessage::Reply {
            correlation_id: id,
            reply_type: "REPLY_GET_FRIENDS".to_string(),
            payload: json!({"Users": []}),
        };

        assert_eq!(router.route(reply.clone(), &mut pending), Routed::Resolved(id));
        assert_eq!(router.route(reply, &mut pending), Routed::Orphan(id));
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_route_event_to_matching_subscribers() {
        let mut router = EventRouter::new();
        let mut pending = PendingCallTable::new();

        let (messages_tx, mut messages_rx) = mpsc::unbounded_channel();
        let (presence_tx, mut presence_rx) = mpsc::unbounded_channel();
        router.subscribe([EventKind::NewMessage], Box::new(messages_tx));
        router.subscribe(
            [EventKind::UserConnected, EventKind::UserDisconnected],
            Box::new(presence_tx),
        );

        assert_eq!(
            router.route(event(EventKind::NewMessage), &mut pending),
            Routed::Delivered {
                kind: EventKind::NewMessage,
                subscribers: 1
            }
        );
        assert_eq!(messages_rx.try_recv().unwrap().kind, EventKind::NewMessage);
        assert!(presence_rx.try_recv().is_err());

        router.route(event(EventKind::UserDisconnected), &mut pending);
        assert_eq!(
            presence_rx.try_recv().unwrap().kind,
            EventKind::UserDisconnected
        );
    }

    #[test]
    fn test_unknown_event_dropped() {
        let mut router = EventRouter::new();
        let mut pending = PendingCallTable::new();
        let seen = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&seen);
        router.subscribe(
            [EventKind::NewMessage],
            Box::new(FnSubscriber(move |_: &Event| *counter.lock().unwrap() += 1)),
        );

        let routed = router.route(
            event(EventKind::Unknown("EVENT_TYPING".to_string())),
            &mut pending,
        );
        assert_eq!(routed, Routed::UnknownEvent("EVENT_TYPING".to_string()));
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn test_protocol_error_discards_call() {
        let mut router = EventRouter::new();
        let mut pending = PendingCallTable::new();
        let mut errors = router.errors();
        let outcomes = Arc::default();

        let id = pending.issue(RequestType::AddFriend, recorder(&outcomes));
        let routed = router.route(
            WireMessage::ProtocolError {
                correlation_id: Some(id),
                message: "no such user".to_string(),
            },
            &mut pending,
        );

        assert_eq!(
            routed,
            Routed::ServerError {
                correlation_id: Some(id),
                discarded_call: true
            }
        );
        assert!(!pending.contains(id));
        assert!(outcomes.lock().unwrap().is_empty());

        let error = errors.try_recv().unwrap();
        assert_eq!(error.correlation_id, Some(id));
        assert_eq!(error.message, "no such user");
        assert_eq!(error.to_string(), format!("Server error for call {id}: no such user"));
    }

    #[test]
    fn test_closed_subscribers_pruned() {
        let mut router = EventRouter::new();
        let mut pending = PendingCallTable::new();

        let (tx, rx) = mpsc::unbounded_channel();
        router.subscribe([EventKind::NewMessage], Box::new(tx));
        assert_eq!(router.subscription_count(), 1);

        drop(rx);
        let routed = router.route(event(EventKind::NewMessage), &mut pending);
        assert_eq!(
            routed,
            Routed::Delivered {
                kind: EventKind::NewMessage,
                subscribers: 0
            }
        );
        assert_eq!(router.subscription_count(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let mut router = EventRouter::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = router.subscribe([EventKind::FriendRequest], Box::new(tx));
        assert!(router.unsubscribe(id));
        assert!(!router.unsubscribe(id));
    }
}
