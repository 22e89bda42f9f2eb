//! Notification events for the embedding UI
//!
//! The follower watcher and session layer publish here instead of talking to
//! a rendering layer directly. Built on `tokio::sync::broadcast`: emitting
//! with no subscribers is a no-op, and a lagging subscriber drops old events
//! rather than blocking the emitter.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Non-blocking; the send error for "no receivers" is deliberately ignored.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// What the UI would have rendered as a toast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Accounts that started following since the previous check.
    NewFollowers { count: usize },

    /// Accounts that stopped following since the previous check.
    LostFollowers { count: usize },

    /// A follower check finished and state was committed.
    CheckCompleted {
        gained: usize,
        lost: usize,
        checked_at: i64,
    },

    /// A follower check failed; persisted state is untouched.
    CheckFailed { message: String },

    /// The session could not be resumed and the user was logged out.
    SessionExpired { message: String },
}
