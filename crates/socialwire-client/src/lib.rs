//! # socialwire-client
//!
//! The connection manager and client handle for the socialwire event socket.
//!
//! One background task owns the socket. A [`Client`] handle sends it
//! commands: requests to correlate with replies, and subscriptions to
//! server-pushed events. Requests issued while the socket is down are queued
//! and written, in order, as soon as it reconnects.
//!
//! ## Example
//!
//! ```rust,ignore
//! use socialwire_client::{Client, ClientConfig};
//! use socialwire_protocol::{requests::GetFriends, EventKind};
//! use socialwire_transport::{Endpoint, WebSocketConnector};
//!
//! let endpoint = Endpoint::for_origin("https://social.example.com")?;
//! let (client, _task) = Client::start(WebSocketConnector::default(), endpoint, ClientConfig::default());
//!
//! let mut messages = client.subscribe(EventKind::NewMessage)?;
//! let friends = client.request(&GetFriends { limit: 50 }).await?;
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod metrics;
mod presence;

pub use client::{Client, ClientError};
pub use config::{Backoff, ClientConfig, ReconnectPolicy, MIN_RECONNECT_DELAY};
