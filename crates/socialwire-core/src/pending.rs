//! Pending-call table.
//!
//! Every request gets a correlation id from a counter that starts at 1 and
//! never resets for the lifetime of the table, reconnects included. The
//! callback registered under that id is invoked at most once: on the matching
//! reply, on rejection, or never when the call is discarded.

use serde_json::Value;
use socialwire_protocol::{CorrelationId, RequestType};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

/// First id handed out by [`PendingCallTable::allocate`].
pub const FIRST_CORRELATION_ID: CorrelationId = 1;

/// Continuation invoked with the reply payload or the reason the call failed.
pub type ReplyCallback = Box<dyn FnOnce(Result<Value, CallError>) + Send + 'static>;

/// Why a call completed without a reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The socket closed while the request was in flight.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The outbound queue was full while disconnected.
    #[error("Outbound queue full ({0} sends waiting)")]
    QueueFull(usize),

    /// No reply arrived within the configured request timeout.
    #[error("No reply within {0:?}")]
    TimedOut(Duration),

    /// The server reported an error for this call; the entry was dropped.
    #[error("Call discarded after a server error")]
    Discarded,

    /// The client shut down before a reply arrived.
    #[error("Client shut down")]
    Shutdown,

    /// The reply did not match the expected shape.
    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    /// The request could not be encoded.
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Pending table errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PendingError {
    /// The id already has a live call.
    #[error("Correlation id {0} is already pending")]
    Duplicate(CorrelationId),
}

/// A request waiting for its reply.
pub struct PendingCall {
    /// Correlation id.
    pub correlation_id: CorrelationId,
    /// Request type, kept for logging.
    pub request_type: RequestType,
    /// When the call was registered.
    pub issued_at: Instant,
    /// Whether the frame was written to a live socket.
    pub transmitted: bool,
    callback: ReplyCallback,
}

impl PendingCall {
    fn complete(self, result: Result<Value, CallError>) {
        (self.callback)(result);
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("correlation_id", &self.correlation_id)
            .field("request_type", &self.request_type)
            .field("issued_at", &self.issued_at)
            .field("transmitted", &self.transmitted)
            .finish_non_exhaustive()
    }
}

/// Registry of calls waiting on a reply, keyed by correlation id.
#[derive(Debug)]
pub struct PendingCallTable {
    next_id: CorrelationId,
    calls: HashMap<CorrelationId, PendingCall>,
}

impl PendingCallTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: FIRST_CORRELATION_ID,
            calls: HashMap::new(),
        }
    }

    /// Hand out the next correlation id.
    pub fn allocate(&mut self) -> CorrelationId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Register a callback under `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PendingError::Duplicate`] if the id is already live; the
    /// existing entry is left untouched.
    pub fn register(
        &mut self,
        correlation_id: CorrelationId,
        request_type: RequestType,
        callback: ReplyCallback,
    ) -> Result<(), PendingError> {
        if self.calls.contains_key(&correlation_id) {
            return Err(PendingError::Duplicate(correlation_id));
        }

        self.calls.insert(
            correlation_id,
            PendingCall {
                correlation_id,
                request_type,
                issued_at: Instant::now(),
                transmitted: false,
                callback,
            },
        );
        trace!(correlation_id, %request_type, "Registered pending call");
        Ok(())
    }

    /// Allocate an id and register `callback` under it.
    pub fn issue(&mut self, request_type: RequestType, callback: ReplyCallback) -> CorrelationId {
        let id = self.allocate();
        // Freshly allocated ids are never live.
        let _ = self.register(id, request_type, callback);
        id
    }

    /// Record that the request was written to the socket.
    pub fn mark_transmitted(&mut self, correlation_id: CorrelationId) -> bool {
        match self.calls.get_mut(&correlation_id) {
            Some(call) => {
                call.transmitted = true;
                true
            }
            None => false,
        }
    }

    /// Complete a call with its reply payload.
    ///
    /// Returns `false` if no call is pending under the id (an orphan reply).
    pub fn resolve(&mut self, correlation_id: CorrelationId, payload: Value) -> bool {
        match self.calls.remove(&correlation_id) {
            Some(call) => {
                trace!(correlation_id, request_type = %call.request_type, "Resolved pending call");
                call.complete(Ok(payload));
                true
            }
            None => {
                debug!(correlation_id, "No pending call for reply");
                false
            }
        }
    }

    /// Complete a call with an error.
    pub fn reject(&mut self, correlation_id: CorrelationId, error: CallError) -> bool {
        match self.calls.remove(&correlation_id) {
            Some(call) => {
                debug!(correlation_id, request_type = %call.request_type, %error, "Rejected pending call");
                call.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Remove a call without invoking its callback.
    pub fn discard(&mut self, correlation_id: CorrelationId) -> bool {
        self.calls.remove(&correlation_id).is_some()
    }

    /// Reject every in-flight call with [`CallError::TransportFailure`].
    ///
    /// Calls that were never transmitted stay registered; their sends are
    /// still waiting in the outbound queue. Returns the number rejected.
    pub fn drain_all(&mut self, reason: &str) -> usize {
        let ids = self.sorted_ids(|call| call.transmitted);
        for id in &ids {
            self.reject(*id, CallError::TransportFailure(reason.to_string()));
        }
        if !ids.is_empty() {
            debug!(rejected = ids.len(), reason, "Drained in-flight calls");
        }
        ids.len()
    }

    /// Reject in-flight calls issued more than `timeout` before `now`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> usize {
        let ids = self.sorted_ids(|call| {
            call.transmitted && now.saturating_duration_since(call.issued_at) >= timeout
        });
        for id in &ids {
            self.reject(*id, CallError::TimedOut(timeout));
        }
        ids.len()
    }

    /// Reject every call, transmitted or not.
    pub fn reject_all(&mut self, error: &CallError) -> usize {
        let ids = self.sorted_ids(|_| true);
        for id in &ids {
            self.reject(*id, error.clone());
        }
        ids.len()
    }

    /// Number of live calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no call is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Whether a call is pending under the id.
    #[must_use]
    pub fn contains(&self, correlation_id: CorrelationId) -> bool {
        self.calls.contains_key(&correlation_id)
    }

    /// Number of calls written to the socket and still unanswered.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.calls.values().filter(|call| call.transmitted).count()
    }

    /// Look up a live call.
    #[must_use]
    pub fn get(&self, correlation_id: CorrelationId) -> Option<&PendingCall> {
        self.calls.get(&correlation_id)
    }

    fn sorted_ids(&self, filter: impl Fn(&PendingCall) -> bool) -> Vec<CorrelationId> {
        let mut ids: Vec<_> = self
            .calls
            .values()
            .filter(|call| filter(call))
            .map(|call| call.correlation_id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for PendingCallTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Outcomes = Arc<Mutex<Vec<(CorrelationId, Result<Value, CallError>)>>>;

    fn recorder(outcomes: &Outcomes, id: CorrelationId) -> ReplyCallback {
        let outcomes = Arc::clone(outcomes);
        Box::new(move |result| outcomes.lock().unwrap().push((id, result)))
    }

    #[test]
    fn test_ids_strictly_increase_from_one() {
        let mut table = PendingCallTable::new();
        let ids: Vec<_> = (0..5).map(|_| table.allocate()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let outcomes = Outcomes::default();
        let id = table.issue(RequestType::GetFriends, recorder(&outcomes, 6));
        assert_eq!(id, 6);
        assert!(table.contains(6));
    }

    #[test]
    fn test_resolve_invokes_once() {
        let mut table = PendingCallTable::new();
        let outcomes = Outcomes::default();

        let id = table.allocate();
        table
            .register(id, RequestType::GetProfile, recorder(&outcomes, id))
            .unwrap();

        assert!(table.resolve(id, json!({"Name": "Alice"})));
        // A duplicate reply is an orphan.
        assert!(!table.resolve(id, json!({"Name": "Alice"})));

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0], (id, Ok(json!({"Name": "Alice"}))));
        assert!(table.is_empty());
    }

    #[test]
    fn test_register_duplicate() {
        let mut table = PendingCallTable::new();
        let outcomes = Outcomes::default();

        table
            .register(7, RequestType::GetFriends, recorder(&outcomes, 7))
            .unwrap();
        assert_eq!(
            table.register(7, RequestType::GetProfile, recorder(&outcomes, 7)),
            Err(PendingError::Duplicate(7))
        );
        assert_eq!(table.get(7).unwrap().request_type, RequestType::GetFriends);
    }

    #[test]
    fn test_discard_skips_callback() {
        let mut table = PendingCallTable::new();
        let outcomes = Outcomes::default();

        let id = table.issue(RequestType::SendMessage, recorder(&outcomes, 1));
        assert!(table.discard(id));
        assert!(!table.discard(id));
        assert!(!table.resolve(id, json!({})));
        assert!(outcomes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drain_all_keeps_untransmitted() {
        let mut table = PendingCallTable::new();
        let outcomes = Outcomes::default();

        let sent_a = table.issue(RequestType::GetFriends, recorder(&outcomes, 1));
        let queued = table.issue(RequestType::GetFriends, recorder(&outcomes, 2));
        let sent_b = table.issue(RequestType::GetFriends, recorder(&outcomes, 3));
        table.mark_transmitted(sent_b);
        table.mark_transmitted(sent_a);
        assert_eq!(table.in_flight(), 2);

        assert_eq!(table.drain_all("socket closed"), 2);
        assert!(table.contains(queued));
        assert_eq!(table.in_flight(), 0);

        let outcomes = outcomes.lock().unwrap();
        let failure: Result<Value, CallError> =
            Err(CallError::TransportFailure("socket closed".to_string()));
        assert_eq!(*outcomes, vec![(1, failure.clone()), (3, failure)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_in_flight() {
        let mut table = PendingCallTable::new();
        let outcomes = Outcomes::default();
        let timeout = Duration::from_secs(10);

        let old = table.issue(RequestType::GetTimeline, recorder(&outcomes, 1));
        table.mark_transmitted(old);
        let unsent = table.issue(RequestType::GetTimeline, recorder(&outcomes, 2));

        tokio::time::advance(Duration::from_secs(6)).await;
        let fresh = table.issue(RequestType::GetTimeline, recorder(&outcomes, 3));
        table.mark_transmitted(fresh);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(table.expire(Instant::now(), timeout), 1);
        assert!(table.contains(unsent));
        assert!(table.contains(fresh));
        assert_eq!(
            outcomes.lock().unwrap()[0],
            (1, Err(CallError::TimedOut(timeout)))
        );
    }

    #[test]
    fn test_reject_all() {
        let mut table = PendingCallTable::new();
        let outcomes = Outcomes::default();

        table.issue(RequestType::GetFriends, recorder(&outcomes, 1));
        let id = table.issue(RequestType::GetFriends, recorder(&outcomes, 2));
        table.mark_transmitted(id);

        assert_eq!(table.reject_all(&CallError::Shutdown), 2);
        assert!(table.is_empty());
        assert!(outcomes
            .lock()
            .unwrap()
            .iter()
            .all(|(_, result)| *result == Err(CallError::Shutdown)));

        // The counter keeps going after the table empties.
        assert_eq!(table.allocate(), 3);
    }
}
