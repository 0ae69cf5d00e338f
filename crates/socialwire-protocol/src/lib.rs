//! # socialwire-protocol
//!
//! Wire protocol definitions for the socialwire event socket.
//!
//! A single WebSocket carries two kinds of traffic: request/reply calls
//! correlated by an integer id, and events pushed by the server without
//! being asked.
//!
//! ## Frames
//!
//! - Outbound: `"<REQUEST_TYPE> <correlation id>\n<json object>"`
//! - Inbound: one JSON object whose `Type` field selects a [`WireMessage`]
//!   case (`EVENT_*` → event, `REPLY_ERROR` → protocol error, anything else →
//!   reply carrying `SeqId`)
//!
//! ## Example
//!
//! ```rust
//! use socialwire_protocol::{codec, requests::GetFriends, WireMessage};
//!
//! let frame = codec::encode_request(7, &GetFriends { limit: 50 }).unwrap();
//! assert!(frame.starts_with("REQUEST_GET_FRIENDS 7\n"));
//!
//! let reply = codec::decode(r#"{"SeqId":7,"Type":"REPLY_GET_FRIENDS","Users":[]}"#).unwrap();
//! assert_eq!(reply.correlation_id(), Some(7));
//! assert!(matches!(reply, WireMessage::Reply { .. }));
//! ```

pub mod codec;
pub mod events;
pub mod frames;
pub mod requests;

pub use codec::{decode, decode_request, encode, encode_request, CodecError, MAX_FRAME_SIZE};
pub use events::UserInfo;
pub use frames::{CorrelationId, Event, EventKind, RequestType, WireMessage};
pub use requests::Request;
