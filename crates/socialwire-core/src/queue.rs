//! Outbound queue for sends issued while the socket is not open.

use serde_json::Value;
use socialwire_protocol::{CorrelationId, RequestType};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::trace;

/// Default bound on queued sends.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A request waiting to be written once the socket opens.
///
/// Its callback lives in the pending-call table under the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSend {
    pub request_type: RequestType,
    pub correlation_id: CorrelationId,
    pub payload: Value,
}

impl QueuedSend {
    #[must_use]
    pub fn new(request_type: RequestType, correlation_id: CorrelationId, payload: Value) -> Self {
        Self {
            request_type,
            correlation_id,
            payload,
        }
    }
}

/// Returned by [`OutboundQueue::enqueue`] when the queue is at capacity.
#[derive(Debug, Error)]
#[error("Outbound queue full (capacity {capacity})")]
pub struct QueueFull {
    /// The queue bound.
    pub capacity: usize,
    /// The send that was not accepted.
    pub rejected: QueuedSend,
}

/// Bounded FIFO of pending sends. Items leave only through [`flush`](Self::flush).
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<QueuedSend>,
    capacity: usize,
}

impl OutboundQueue {
    /// Create a queue with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a queue holding at most `capacity` sends.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Append a send.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] carrying the send back if the queue is at capacity.
    pub fn enqueue(&mut self, send: QueuedSend) -> Result<(), QueueFull> {
        if self.items.len() >= self.capacity {
            return Err(QueueFull {
                capacity: self.capacity,
                rejected: send,
            });
        }

        trace!(
            correlation_id = send.correlation_id,
            depth = self.items.len() + 1,
            "Queued send"
        );
        self.items.push_back(send);
        Ok(())
    }

    /// Hand every queued send to `transmit` in enqueue order.
    ///
    /// An item is removed only after `transmit` accepted it. On the first
    /// error the failed item and everything behind it stay queued, in order.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by `transmit`.
    pub fn flush<E, F>(&mut self, mut transmit: F) -> Result<usize, E>
    where
        F: FnMut(&QueuedSend) -> Result<(), E>,
    {
        let mut sent = 0;
        while let Some(front) = self.items.front() {
            transmit(front)?;
            self.items.pop_front();
            sent += 1;
        }
        Ok(sent)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids of the queued sends, front first.
    #[must_use]
    pub fn correlation_ids(&self) -> Vec<CorrelationId> {
        self.items.iter().map(|send| send.correlation_id).collect()
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn send(id: CorrelationId) -> QueuedSend {
        QueuedSend::new(RequestType::SendMessage, id, json!({"Text": id}))
    }

    #[test]
    fn test_flush_in_order() {
        let mut queue = OutboundQueue::new();
        for id in 1..=5 {
            queue.enqueue(send(id)).unwrap();
        }

        let mut written = Vec::new();
        let sent = queue
            .flush(|item| {
                written.push(item.correlation_id);
                Ok::<_, ()>(())
            })
            .unwrap();

        assert_eq!(sent, 5);
        assert_eq!(written, vec![1, 2, 3, 4, 5]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_stops_at_first_failure() {
        let mut queue = OutboundQueue::new();
        for id in 1..=4 {
            queue.enqueue(send(id)).unwrap();
        }

        let result = queue.flush(|item| {
            if item.correlation_id == 3 {
                Err("socket closed")
            } else {
                Ok(())
            }
        });

        assert_eq!(result, Err("socket closed"));
        assert_eq!(queue.correlation_ids(), vec![3, 4]);

        // Later flush picks up where the failed one stopped.
        let mut written = Vec::new();
        queue
            .flush(|item| {
                written.push(item.correlation_id);
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(written, vec![3, 4]);
    }

    #[test]
    fn test_enqueue_full() {
        let mut queue = OutboundQueue::with_capacity(2);
        queue.enqueue(send(1)).unwrap();
        queue.enqueue(send(2)).unwrap();

        let err = queue.enqueue(send(3)).unwrap_err();
        assert_eq!(err.capacity, 2);
        assert_eq!(err.rejected.correlation_id, 3);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.capacity(), 2);
    }

    #[test]
    fn test_flush_empty() {
        let mut queue = OutboundQueue::default();
        assert_eq!(queue.flush(|_| Err::<(), _>("unused")), Ok(0));
    }
}
