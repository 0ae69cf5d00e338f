//! Typed bodies of server-pushed events and the records shared with replies.
//!
//! Field names follow the server's JSON (`PascalCase`). Event bodies are
//! decoded on demand with [`Event::decode`](crate::frames::Event::decode).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A user as the server describes it in presence events and user lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserInfo {
    /// User ID (string-encoded on the wire).
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl UserInfo {
    /// Create a new user record.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Body of `EVENT_ONLINE_USERS_LIST`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OnlineUsersList {
    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<UserInfo>,
}

/// A direct message, both as `EVENT_NEW_MESSAGE` body and as a reply entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DirectMessage {
    pub id: u64,
    #[serde(deserialize_with = "flexible_id")]
    pub user_from: String,
    pub ts: String,
    /// `true` for messages we sent.
    pub is_out: bool,
    pub text: String,
}

/// A feed post, both as `EVENT_NEW_TIMELINE_EVENT` body and as a reply entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TimelinePost {
    pub id: u64,
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub ts: String,
}

/// Body of `EVENT_FRIEND_REQUEST`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FriendRequest {
    /// The user the request is addressed to.
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: String,
}

/// Accept user ids written either as JSON strings or as numbers.
pub(crate) fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected user id, found {other}"
        ))),
    }
}

/// Treat `null` as the type's default (the server encodes empty lists as `null`).
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{Event, EventKind};
    use serde_json::json;

    #[test]
    fn test_online_users_list_decode() {
        let event = Event::new(
            EventKind::OnlineUsersList,
            json!({
                "Type": "EVENT_ONLINE_USERS_LIST",
                "Users": [{"Id": "1", "Name": "Alice"}, {"Id": 2, "Name": "Bob"}]
            }),
        );

        let list: OnlineUsersList = event.decode().unwrap();
        assert_eq!(
            list.users,
            vec![UserInfo::new("1", "Alice"), UserInfo::new("2", "Bob")]
        );
    }

    #[test]
    fn test_null_user_list_is_empty() {
        let list: OnlineUsersList = serde_json::from_value(json!({"Users": null})).unwrap();
        assert!(list.users.is_empty());
    }

    #[test]
    fn test_new_message_decode() {
        let event = Event::new(
            EventKind::NewMessage,
            json!({
                "Type": "EVENT_NEW_MESSAGE",
                "Id": 12,
                "UserFrom": "5",
                "Ts": "1500000000",
                "IsOut": false,
                "Text": "hi"
            }),
        );

        let message: DirectMessage = event.decode().unwrap();
        assert_eq!(message.id, 12);
        assert_eq!(message.user_from, "5");
        assert_eq!(message.text, "hi");
        assert!(!message.is_out);
    }

    #[test]
    fn test_friend_request_numeric_id() {
        let request: FriendRequest =
            serde_json::from_value(json!({"Type": "EVENT_FRIEND_REQUEST", "UserId": 42}))
                .unwrap();
        assert_eq!(request.user_id, "42");
    }

    #[test]
    fn test_user_id_rejects_objects() {
        let result: Result<UserInfo, _> = serde_json::from_value(json!({"Id": {}, "Name": "x"}));
        assert!(result.is_err());
    }
}
