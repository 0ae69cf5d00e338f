//! Frame types for the socialwire protocol.
//!
//! Outbound frames are tagged with a [`RequestType`]. Inbound frames decode
//! into a [`WireMessage`], whose event case carries an [`EventKind`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Integer tag linking an outbound request to its reply.
pub type CorrelationId = u64;

/// Discriminant prefix shared by every server-pushed event.
pub const EVENT_PREFIX: &str = "EVENT_";

/// Discriminant of a server-side protocol error.
pub const REPLY_ERROR: &str = "REPLY_ERROR";

/// Request types understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    GetTimeline,
    AddTimelinePost,
    GetMessageThreads,
    GetMessages,
    SendMessage,
    GetProfile,
    UpdateProfile,
    GetFriends,
    GetUsersList,
    AddFriend,
    ConfirmFriendship,
    GetTimelineByTag,
}

impl RequestType {
    /// Every request type, in catalog order.
    pub const ALL: [RequestType; 12] = [
        RequestType::GetTimeline,
        RequestType::AddTimelinePost,
        RequestType::GetMessageThreads,
        RequestType::GetMessages,
        RequestType::SendMessage,
        RequestType::GetProfile,
        RequestType::UpdateProfile,
        RequestType::GetFriends,
        RequestType::GetUsersList,
        RequestType::AddFriend,
        RequestType::ConfirmFriendship,
        RequestType::GetTimelineByTag,
    ];

    /// The tag written on the header line of an outbound frame.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestType::GetTimeline => "REQUEST_GET_TIMELINE",
            RequestType::AddTimelinePost => "REQUEST_ADD_TO_TIMELINE",
            RequestType::GetMessageThreads => "REQUEST_GET_MESSAGES_USERS",
            RequestType::GetMessages => "REQUEST_GET_MESSAGES",
            RequestType::SendMessage => "REQUEST_SEND_MESSAGE",
            RequestType::GetProfile => "REQUEST_GET_PROFILE",
            RequestType::UpdateProfile => "REQUEST_UPDATE_PROFILE",
            RequestType::GetFriends => "REQUEST_GET_FRIENDS",
            RequestType::GetUsersList => "REQUEST_GET_USERS_LIST",
            RequestType::AddFriend => "REQUEST_ADD_FRIEND",
            RequestType::ConfirmFriendship => "REQUEST_CONFIRM_FRIENDSHIP",
            RequestType::GetTimelineByTag => "REQUEST_GET_TIMELINE_FOR_HASH",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = &'static str;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        RequestType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == tag)
            .ok_or("Invalid request type")
    }
}

/// Kinds of server-pushed events.
///
/// Tags outside the catalog decode to [`EventKind::Unknown`] instead of
/// failing, so a newer server cannot break an older client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Bulk snapshot of currently online users, sent on every new connection.
    OnlineUsersList,
    UserConnected,
    UserDisconnected,
    /// New direct message.
    NewMessage,
    /// New post in the feed.
    NewTimelineEvent,
    /// Somebody asked to become our friend.
    FriendRequest,
    /// An `EVENT_*` tag this client does not know.
    Unknown(String),
}

impl EventKind {
    /// Map an `EVENT_*` discriminant to its kind.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "EVENT_ONLINE_USERS_LIST" => EventKind::OnlineUsersList,
            "EVENT_USER_CONNECTED" => EventKind::UserConnected,
            "EVENT_USER_DISCONNECTED" => EventKind::UserDisconnected,
            "EVENT_NEW_MESSAGE" => EventKind::NewMessage,
            "EVENT_NEW_TIMELINE_EVENT" => EventKind::NewTimelineEvent,
            "EVENT_FRIEND_REQUEST" => EventKind::FriendRequest,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    /// The wire discriminant for this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::OnlineUsersList => "EVENT_ONLINE_USERS_LIST",
            EventKind::UserConnected => "EVENT_USER_CONNECTED",
            EventKind::UserDisconnected => "EVENT_USER_DISCONNECTED",
            EventKind::NewMessage => "EVENT_NEW_MESSAGE",
            EventKind::NewTimelineEvent => "EVENT_NEW_TIMELINE_EVENT",
            EventKind::FriendRequest => "EVENT_FRIEND_REQUEST",
            EventKind::Unknown(tag) => tag,
        }
    }

    /// Whether the kind is part of the known catalog.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Unknown(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server-pushed event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event kind.
    pub kind: EventKind,
    /// The full decoded JSON object, discriminant included.
    pub payload: Value,
}

impl Event {
    /// Create a new event.
    #[must_use]
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Deserialize the payload into one of the typed event bodies.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde::Deserialize::deserialize(&self.payload)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Reply to an earlier request.
    Reply {
        /// Id of the request this answers.
        correlation_id: CorrelationId,
        /// The reply discriminant (e.g. `REPLY_GENERIC`).
        reply_type: String,
        /// The full decoded JSON object.
        payload: Value,
    },

    /// Server-pushed event.
    Event(Event),

    /// Server-side failure report.
    ProtocolError {
        /// Id of the failed request, when the server named one.
        correlation_id: Option<CorrelationId>,
        /// Human-readable message.
        message: String,
    },
}

impl WireMessage {
    /// The correlation id carried by the message, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            WireMessage::Reply { correlation_id, .. } => Some(*correlation_id),
            WireMessage::Event(_) => None,
            WireMessage::ProtocolError { correlation_id, .. } => *correlation_id,
        }
    }

    /// The wire discriminant of the message.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            WireMessage::Reply { reply_type, .. } => reply_type,
            WireMessage::Event(event) => event.kind.as_str(),
            WireMessage::ProtocolError { .. } => REPLY_ERROR,
        }
    }
}
