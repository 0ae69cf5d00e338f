//! # socialwire-core
//!
//! Connection-independent building blocks of the socialwire client.
//!
//! - **Pending** - Correlation ids and the callbacks waiting on replies
//! - **Queue** - Bounded FIFO of sends issued while disconnected
//! - **Router** - Dispatches decoded frames to calls, subscribers and the error sink
//! - **Presence** - Reference-counted set of online users
//! - **State** - Connection lifecycle states
//!
//! None of these types do I/O. They are owned by the single connection task
//! in `socialwire-client` and mutated only from there.
//!
//! ## Architecture
//!
//! ```text
//!  inbound frame ──▶ ┌─────────────┐ ──▶ ┌──────────────┐
//!                    │ EventRouter │     │ PendingCalls │
//!                    └─────────────┘     └──────────────┘
//!                       │       │
//!                       ▼       ▼
//!              ┌───────────┐ ┌────────────┐
//!              │ Presence  │ │ error sink │
//!              └───────────┘ └────────────┘
//! ```

pub mod pending;
pub mod presence;
pub mod queue;
pub mod router;
pub mod state;

pub use pending::{CallError, PendingCall, PendingCallTable, PendingError, ReplyCallback};
pub use presence::{PresenceEntry, PresenceTracker, PRESENCE_KINDS};
pub use queue::{OutboundQueue, QueueFull, QueuedSend, DEFAULT_QUEUE_CAPACITY};
pub use router::{
    EventRouter, FnSubscriber, Routed, RouterConfig, ServerError, Subscriber, SubscriptionId,
};
pub use state::ConnectionState;
