//! Presence tracking.
//!
//! A user may hold several sessions, so the server can announce the same user
//! more than once. Each user carries a reference count: connects increment
//! it, disconnects decrement it, and the user is online while it is positive.

use crate::router::Subscriber;
use socialwire_protocol::events::OnlineUsersList;
use socialwire_protocol::{Event, EventKind, UserInfo};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Event kinds the tracker consumes.
pub const PRESENCE_KINDS: [EventKind; 3] = [
    EventKind::OnlineUsersList,
    EventKind::UserConnected,
    EventKind::UserDisconnected,
];

/// One online user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub user_id: String,
    /// Name from the first announcement; later ones do not overwrite it.
    pub display_name: String,
    /// Number of open sessions, always at least 1.
    pub refcount: u32,
}

/// Reference-counted set of online users.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    users: HashMap<String, PresenceEntry>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more session for `user`.
    ///
    /// Returns `true` if the user just came online.
    pub fn connect(&mut self, user: UserInfo) -> bool {
        match self.users.get_mut(&user.id) {
            Some(entry) => {
                entry.refcount = entry.refcount.saturating_add(1);
                false
            }
            None => {
                debug!(user = %user.id, name = %user.name, "Presence: user online");
                self.users.insert(
                    user.id.clone(),
                    PresenceEntry {
                        user_id: user.id,
                        display_name: user.name,
                        refcount: 1,
                    },
                );
                true
            }
        }
    }

    /// Drop one session for `user_id`.
    ///
    /// Returns `true` if the user went offline. Unknown users are ignored.
    pub fn disconnect(&mut self, user_id: &str) -> bool {
        let Some(entry) = self.users.get_mut(user_id) else {
            return false;
        };

        entry.refcount -= 1;
        if entry.refcount > 0 {
            return false;
        }

        self.users.remove(user_id);
        debug!(user = %user_id, "Presence: user offline");
        true
    }

    /// Apply a full snapshot, one connect per listed user.
    ///
    /// The snapshot adds to the current counts; call [`clear`](Self::clear)
    /// first when it should replace them.
    pub fn apply_snapshot(&mut self, users: Vec<UserInfo>) {
        for user in users {
            self.connect(user);
        }
    }

    /// Update from a presence event.
    ///
    /// Returns `true` if the event changed the tracker. Events of other kinds
    /// and undecodable bodies are ignored.
    pub fn apply(&mut self, event: &Event) -> bool {
        match event.kind {
            EventKind::OnlineUsersList => match event.decode::<OnlineUsersList>() {
                Ok(list) => {
                    let changed = !list.users.is_empty();
                    self.apply_snapshot(list.users);
                    changed
                }
                Err(e) => {
                    warn!(error = %e, "Malformed online users list");
                    false
                }
            },
            EventKind::UserConnected => match event.decode::<UserInfo>() {
                Ok(user) => {
                    self.connect(user);
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Malformed user connected event");
                    false
                }
            },
            EventKind::UserDisconnected => match event.decode::<UserInfo>() {
                Ok(user) => {
                    let known = self.users.contains_key(&user.id);
                    self.disconnect(&user.id);
                    known
                }
                Err(e) => {
                    warn!(error = %e, "Malformed user disconnected event");
                    false
                }
            },
            _ => false,
        }
    }

    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Open sessions for a user; 0 when offline.
    #[must_use]
    pub fn refcount(&self, user_id: &str) -> u32 {
        self.users.get(user_id).map_or(0, |entry| entry.refcount)
    }

    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&PresenceEntry> {
        self.users.get(user_id)
    }

    /// Online users sorted by user id.
    #[must_use]
    pub fn online(&self) -> Vec<PresenceEntry> {
        let mut users: Vec<_> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.users.len()
    }

    /// Forget everyone.
    pub fn clear(&mut self) {
        self.users.clear();
    }
}

impl Subscriber for PresenceTracker {
    fn handle(&mut self, event: &Event) {
        self.apply(event);
    }

    // The server sends a fresh snapshot on every new connection.
    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_event(kind: EventKind, id: &str, name: &str) -> Event {
        Event::new(
            kind.clone(),
            json!({"Type": kind.as_str(), "Id": id, "Name": name}),
        )
    }

    #[test]
    fn test_snapshot_then_disconnect() {
        let mut presence = PresenceTracker::new();
        let snapshot = Event::new(
            EventKind::OnlineUsersList,
            json!({
                "Type": "EVENT_ONLINE_USERS_LIST",
                "Users": [{"Id": "a", "Name": "Alice"}, {"Id": "b", "Name": "Bob"}]
            }),
        );

        assert!(presence.apply(&snapshot));
        assert!(presence.apply(&user_event(EventKind::UserDisconnected, "a", "Alice")));

        let online: Vec<_> = presence.online().into_iter().map(|e| e.user_id).collect();
        assert_eq!(online, vec!["b".to_string()]);
    }

    #[test]
    fn test_duplicate_connect_counts_sessions() {
        let mut presence = PresenceTracker::new();

        assert!(presence.connect(UserInfo::new("a", "Alice")));
        assert!(!presence.connect(UserInfo::new("a", "Alice (phone)")));
        assert_eq!(presence.refcount("a"), 2);
        assert_eq!(presence.get("a").unwrap().display_name, "Alice");

        assert!(!presence.disconnect("a"));
        assert!(presence.is_online("a"));
        assert!(presence.disconnect("a"));
        assert!(!presence.is_online("a"));
        assert_eq!(presence.refcount("a"), 0);
    }

    #[test]
    fn test_disconnect_unknown_is_noop() {
        let mut presence = PresenceTracker::new();
        presence.connect(UserInfo::new("a", "Alice"));

        assert!(!presence.disconnect("zed"));
        assert!(!presence.apply(&user_event(EventKind::UserDisconnected, "zed", "")));
        assert_eq!(presence.count(), 1);
    }

    #[test]
    fn test_ignores_other_kinds() {
        let mut presence = PresenceTracker::new();
        let event = Event::new(EventKind::NewMessage, json!({"Type": "EVENT_NEW_MESSAGE"}));

        assert!(!presence.apply(&event));
        assert_eq!(presence.count(), 0);
    }

    #[test]
    fn test_reset_clears() {
        let mut presence = PresenceTracker::new();
        presence.handle(&user_event(EventKind::UserConnected, "a", "Alice"));
        presence.handle(&user_event(EventKind::UserConnected, "b", "Bob"));
        assert_eq!(presence.count(), 2);

        presence.reset();
        assert_eq!(presence.count(), 0);
        assert!(presence.online().is_empty());
    }
}
