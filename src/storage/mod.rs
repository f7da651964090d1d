pub mod memory;
pub mod postgres;

use crate::domain::{Message, MessageDraft, NotificationDraft, Profile, Role};
use crate::error::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Row-level change committed to the message collection, fanned out to
/// every live feed.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Inserted(Message),
    Updated(Message),
}

impl ChangeEvent {
    #[must_use]
    pub const fn message(&self) -> &Message {
        match self {
            Self::Inserted(message) | Self::Updated(message) => message,
        }
    }
}

/// Scoped subscription to the message change feed.
///
/// Dropping the handle unsubscribes, so holding it for exactly the lifetime
/// of a view guarantees release on every exit path.
#[derive(Debug)]
pub struct ChangeFeed {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeFeed {
    #[must_use]
    pub const fn new(rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Waits for the next change event. Returns `None` once the backend
    /// closes the feed. A lagged receiver skips the missed events and keeps
    /// going; the synchronizer reconciles from authoritative data on every
    /// event, so skipped events cost at most one stale interval.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Change feed lagged; continuing");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Message persistence as seen by the synchronizer. Implementations decide
/// storage and fan-out; the synchronizer only assumes the feed eventually
/// echoes every committed insert and read-timestamp update.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All messages between the two participants, ascending by creation
    /// timestamp.
    async fn history_between(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>>;

    /// The most recent message between the two participants, if any.
    async fn latest_between(&self, a: Uuid, b: Uuid) -> Result<Option<Message>>;

    /// Count of messages from `sender_id` to `receiver_id` with no read
    /// timestamp.
    async fn unread_count(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<u64>;

    /// Persists a draft; the store assigns the id and creation timestamp
    /// and fans out an `Inserted` event.
    async fn insert(&self, draft: MessageDraft) -> Result<Message>;

    /// Sets `read_at` on every unread message from `sender_id` to
    /// `receiver_id` in one batch. Only rows without a read timestamp are
    /// touched, so a timestamp can never regress. Returns the number of
    /// messages transitioned.
    async fn mark_read(&self, sender_id: Uuid, receiver_id: Uuid, read_at: OffsetDateTime) -> Result<u64>;

    /// Opens a scoped subscription to the change feed.
    fn subscribe(&self) -> ChangeFeed;
}

/// Read-only access to participant profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Profile>>;
    async fn list_by_role(&self, role: Role) -> Result<Vec<Profile>>;
}

/// Side channel for notification-center records.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: NotificationDraft) -> Result<()>;
}
