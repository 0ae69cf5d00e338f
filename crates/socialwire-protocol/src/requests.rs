//! Typed request catalog.
//!
//! Each request struct knows its [`RequestType`] and the shape of the reply
//! the server answers with. Pages use these through
//! `Client::request`; the untyped `send` path accepts any JSON object.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::events::{flexible_id, nullable, DirectMessage, TimelinePost, UserInfo};
use crate::frames::RequestType;

/// A request payload with a known type tag and reply shape.
pub trait Request: Serialize {
    /// Tag written on the frame header.
    const TYPE: RequestType;

    /// Reply body the server answers with.
    type Reply: DeserializeOwned;
}

/// `REPLY_GENERIC`: acknowledgment of a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GenericReply {
    pub success: bool,
}

/// Feed page (`REPLY_GET_TIMELINE`), also used for tag searches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimelineReply {
    #[serde(default, deserialize_with = "nullable")]
    pub messages: Vec<TimelinePost>,
}

/// Conversation page (`REPLY_MESSAGES_LIST`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessagesReply {
    #[serde(default, deserialize_with = "nullable")]
    pub messages: Vec<DirectMessage>,
}

/// Users we have conversations with (`REPLY_GET_MESSAGES_USERS`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageThreadsReply {
    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<UserInfo>,
}

/// Confirmed friends and pending friend requests (`REPLY_GET_FRIENDS`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FriendsReply {
    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<UserInfo>,
    #[serde(default, deserialize_with = "nullable")]
    pub friend_requests: Vec<UserInfo>,
}

/// One row of the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserListEntry {
    #[serde(flatten)]
    pub user: UserInfo,
    #[serde(default)]
    pub is_friend: bool,
    #[serde(default)]
    pub friendship_confirmed: bool,
}

/// User directory (`REPLY_USERS_LIST`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UsersListReply {
    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<UserListEntry>,
}

/// A user profile (`REPLY_GET_PROFILE`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProfileReply {
    pub name: String,
    pub birthdate: String,
    pub sex: u8,
    pub description: String,
    #[serde(deserialize_with = "flexible_id")]
    pub city_id: String,
    pub city_name: String,
    pub family_position: u8,
}

/// Fetch the feed, newest first, optionally older than `date_end`.
///
/// `date_end` is the `ts` of the oldest post already shown, passed back as
/// the string the server sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetTimeline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_end: Option<String>,
    pub limit: u64,
}

impl Request for GetTimeline {
    const TYPE: RequestType = RequestType::GetTimeline;
    type Reply = TimelineReply;
}

/// Publish a post to our feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddTimelinePost {
    pub text: String,
}

impl Request for AddTimelinePost {
    const TYPE: RequestType = RequestType::AddTimelinePost;
    type Reply = GenericReply;
}

/// List the users we have conversations with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetMessageThreads {
    pub limit: u64,
}

impl Request for GetMessageThreads {
    const TYPE: RequestType = RequestType::GetMessageThreads;
    type Reply = MessageThreadsReply;
}

/// Fetch a conversation with `user_to`, optionally older than the message
/// whose `ts` is `date_end`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetMessages {
    pub user_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_end: Option<String>,
    pub limit: u64,
}

impl Request for GetMessages {
    const TYPE: RequestType = RequestType::GetMessages;
    type Reply = MessagesReply;
}

/// Send a direct message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMessage {
    pub user_to: String,
    pub text: String,
}

impl Request for SendMessage {
    const TYPE: RequestType = RequestType::SendMessage;
    type Reply = GenericReply;
}

/// Fetch a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetProfile {
    pub user_id: String,
}

impl Request for GetProfile {
    const TYPE: RequestType = RequestType::GetProfile;
    type Reply = ProfileReply;
}

/// Update our own profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateProfile {
    pub name: String,
    pub birthdate: String,
    pub sex: u8,
    pub city_name: String,
    pub family_position: u8,
}

impl Request for UpdateProfile {
    const TYPE: RequestType = RequestType::UpdateProfile;
    type Reply = GenericReply;
}

/// List friends and incoming friend requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetFriends {
    pub limit: u64,
}

impl Request for GetFriends {
    const TYPE: RequestType = RequestType::GetFriends;
    type Reply = FriendsReply;
}

/// List the user directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetUsersList {
    pub limit: u64,
}

impl Request for GetUsersList {
    const TYPE: RequestType = RequestType::GetUsersList;
    type Reply = UsersListReply;
}

/// Send a friend request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddFriend {
    pub friend_id: String,
}

impl Request for AddFriend {
    const TYPE: RequestType = RequestType::AddFriend;
    type Reply = GenericReply;
}

/// Accept an incoming friend request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfirmFriendship {
    pub friend_id: String,
}

impl Request for ConfirmFriendship {
    const TYPE: RequestType = RequestType::ConfirmFriendship;
    type Reply = GenericReply;
}

/// Fetch feed posts carrying a hashtag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetTimelineByTag {
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_end: Option<u64>,
    pub limit: u64,
}

impl Request for GetTimelineByTag {
    const TYPE: RequestType = RequestType::GetTimelineByTag;
    type Reply = TimelineReply;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_field_names() {
        let request = GetMessages {
            user_to: "17".to_string(),
            date_end: None,
            limit: 10,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"UserTo": "17", "Limit": 10})
        );

        let request = GetTimelineByTag {
            hash: "rust".to_string(),
            date_end: Some(1_500_000_000),
            limit: 11,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"Hash": "rust", "DateEnd": 1_500_000_000u64, "Limit": 11})
        );
    }

    #[test]
    fn test_page_cursors_are_strings() {
        let request = GetTimeline {
            date_end: Some("1500000000".to_string()),
            limit: 11,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value["DateEnd"].is_string());
        assert_eq!(value, json!({"DateEnd": "1500000000", "Limit": 11}));

        let request = GetMessages {
            user_to: "5".to_string(),
            date_end: Some("1500000000".to_string()),
            limit: 11,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"UserTo": "5", "DateEnd": "1500000000", "Limit": 11})
        );
    }

    #[test]
    fn test_request_types() {
        assert_eq!(GetMessageThreads::TYPE, RequestType::GetMessageThreads);
        assert_eq!(AddTimelinePost::TYPE.as_str(), "REQUEST_ADD_TO_TIMELINE");
        assert_eq!(GetTimelineByTag::TYPE.as_str(), "REQUEST_GET_TIMELINE_FOR_HASH");
    }

    #[test]
    fn test_friends_reply_with_null_lists() {
        let reply: FriendsReply = serde_json::from_value(json!({
            "SeqId": 4,
            "Type": "REPLY_GET_FRIENDS",
            "Users": [{"Id": "2", "Name": "Bob"}],
            "FriendRequests": null
        }))
        .unwrap();

        assert_eq!(reply.users, vec![UserInfo::new("2", "Bob")]);
        assert!(reply.friend_requests.is_empty());
    }

    #[test]
    fn test_users_list_entry_flattens_user() {
        let reply: UsersListReply = serde_json::from_value(json!({
            "Users": [{"Id": "3", "Name": "Carol", "IsFriend": true, "FriendshipConfirmed": false}]
        }))
        .unwrap();

        let entry = &reply.users[0];
        assert_eq!(entry.user, UserInfo::new("3", "Carol"));
        assert!(entry.is_friend);
        assert!(!entry.friendship_confirmed);
    }
}
