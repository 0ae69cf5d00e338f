//! # socialwire-transport
//!
//! Transport abstraction for the socialwire client.
//!
//! - **WebSocket** - tokio-tungstenite client, `ws://` and `wss://`
//! - **Memory** - in-process channel pair standing in for a server
//!
//! ## Transport Abstraction
//!
//! A [`Connector`] opens [`Connection`]s to an [`Endpoint`]. Connections move
//! whole text frames; framing and decoding live in `socialwire-protocol`.
//!
//! ```rust,ignore
//! use socialwire_transport::{Connector, Endpoint};
//!
//! async fn pump(connector: &dyn Connector) {
//!     let endpoint = Endpoint::for_origin("https://social.example.com").unwrap();
//!     let mut conn = connector.connect(&endpoint).await.unwrap();
//!     while let Ok(Some(text)) = conn.recv().await {
//!         // Decode frame
//!     }
//! }
//! ```

pub mod endpoint;
pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use endpoint::{Endpoint, EVENTS_PATH};
pub use memory::{memory_transport, MemoryConnector, MemoryListener, MemoryPeer};
pub use traits::{Connection, ConnectionId, Connector, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnector};
