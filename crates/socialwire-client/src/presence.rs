//! Publishes the presence tracker's online set to client handles.

use socialwire_core::{PresenceEntry, PresenceTracker, Subscriber};
use socialwire_protocol::Event;
use tokio::sync::watch;

/// Router subscriber that owns the [`PresenceTracker`] and republishes the
/// online users after every change.
pub(crate) struct PresenceFeed {
    tracker: PresenceTracker,
    online: watch::Sender<Vec<PresenceEntry>>,
}

impl PresenceFeed {
    pub(crate) fn new(online: watch::Sender<Vec<PresenceEntry>>) -> Self {
        Self {
            tracker: PresenceTracker::new(),
            online,
        }
    }

    fn publish(&self) {
        self.online.send_replace(self.tracker.online());
    }
}

impl Subscriber for PresenceFeed {
    fn handle(&mut self, event: &Event) {
        if self.tracker.apply(event) {
            self.publish();
        }
    }

    fn reset(&mut self) {
        if self.tracker.count() > 0 {
            self.tracker.clear();
            self.publish();
        }
    }
}
