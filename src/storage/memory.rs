use crate::domain::{Message, MessageDraft, NotificationDraft, Profile, Role};
use crate::error::{Result, SyncError};
use crate::storage::{ChangeEvent, ChangeFeed, MessageStore, NotificationSink, ProfileStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use time::OffsetDateTime;
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

/// In-memory backend implementing every storage trait.
///
/// Used by the integration tests and by hosts that embed the synchronizer
/// without a database. Assigned timestamps are strictly monotonic so
/// insertion order and timestamp order never disagree within one backend.
#[derive(Debug)]
pub struct MemoryBackend {
    messages: DashMap<Uuid, Message>,
    profiles: DashMap<Uuid, Profile>,
    notifications: Mutex<Vec<NotificationDraft>>,
    feed_tx: broadcast::Sender<ChangeEvent>,
    last_nanos: AtomicI64,
    fail_latest_for: DashMap<Uuid, ()>,
    fail_unread_for: DashMap<Uuid, ()>,
    fail_history_for: DashMap<Uuid, ()>,
    fail_mark_read: AtomicBool,
    fail_deliver: AtomicBool,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(feed_capacity: usize) -> Self {
        let (feed_tx, _) = broadcast::channel(feed_capacity);
        Self {
            messages: DashMap::new(),
            profiles: DashMap::new(),
            notifications: Mutex::new(Vec::new()),
            feed_tx,
            last_nanos: AtomicI64::new(0),
            fail_latest_for: DashMap::new(),
            fail_unread_for: DashMap::new(),
            fail_history_for: DashMap::new(),
            fail_mark_read: AtomicBool::new(false),
            fail_deliver: AtomicBool::new(false),
        }
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id, profile);
    }

    #[must_use]
    pub fn message(&self, id: Uuid) -> Option<Message> {
        self.messages.get(&id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn feed_subscribers(&self) -> usize {
        self.feed_tx.receiver_count()
    }

    pub async fn delivered_notifications(&self) -> Vec<NotificationDraft> {
        self.notifications.lock().await.clone()
    }

    /// Makes `latest_between` fail whenever the given profile is a
    /// participant, until cleared.
    pub fn fail_latest_for(&self, profile_id: Uuid) {
        self.fail_latest_for.insert(profile_id, ());
    }

    /// Makes `unread_count` fail whenever the given profile is the sender,
    /// until cleared.
    pub fn fail_unread_for(&self, profile_id: Uuid) {
        self.fail_unread_for.insert(profile_id, ());
    }

    /// Makes `history_between` fail whenever the given profile is a
    /// participant, until cleared.
    pub fn fail_history_for(&self, profile_id: Uuid) {
        self.fail_history_for.insert(profile_id, ());
    }

    pub fn clear_failures(&self) {
        self.fail_latest_for.clear();
        self.fail_unread_for.clear();
        self.fail_history_for.clear();
        self.fail_mark_read.store(false, Ordering::SeqCst);
        self.fail_deliver.store(false, Ordering::SeqCst);
    }

    pub fn set_fail_mark_read(&self, fail: bool) {
        self.fail_mark_read.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deliver(&self, fail: bool) {
        self.fail_deliver.store(fail, Ordering::SeqCst);
    }

    /// Strictly monotonic timestamp: at least 1µs after the previous one,
    /// never behind the wall clock.
    fn next_timestamp(&self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let now_nanos = i64::try_from(now.unix_timestamp_nanos()).unwrap_or(i64::MAX);
        let prev = self
            .last_nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now_nanos.max(prev.saturating_add(1_000)))
            })
            .unwrap_or(now_nanos);
        let assigned = now_nanos.max(prev.saturating_add(1_000));
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(assigned)).unwrap_or(now)
    }

    fn fan_out(&self, event: ChangeEvent) {
        // A send error only means no live subscribers; nothing to do.
        let _ = self.feed_tx.send(event);
    }

    fn pair_messages(&self, a: Uuid, b: Uuid) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|entry| entry.is_between(a, b))
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by(|x, y| x.created_at.cmp(&y.created_at).then_with(|| x.id.cmp(&y.id)));
        messages
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl MessageStore for MemoryBackend {
    async fn history_between(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        if self.fail_history_for.contains_key(&a) || self.fail_history_for.contains_key(&b) {
            return Err(SyncError::Backend("injected history_between failure".to_string()));
        }
        Ok(self.pair_messages(a, b))
    }

    async fn latest_between(&self, a: Uuid, b: Uuid) -> Result<Option<Message>> {
        if self.fail_latest_for.contains_key(&a) || self.fail_latest_for.contains_key(&b) {
            return Err(SyncError::Backend("injected latest_between failure".to_string()));
        }
        Ok(self.pair_messages(a, b).pop())
    }

    async fn unread_count(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<u64> {
        if self.fail_unread_for.contains_key(&sender_id) {
            return Err(SyncError::Backend("injected unread_count failure".to_string()));
        }
        let count = self
            .messages
            .iter()
            .filter(|entry| entry.sender_id == sender_id && entry.is_unread_for(receiver_id))
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, draft: MessageDraft) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            content: draft.content,
            created_at: self.next_timestamp(),
            read_at: None,
        };
        self.messages.insert(message.id, message.clone());
        self.fan_out(ChangeEvent::Inserted(message.clone()));
        Ok(message)
    }

    async fn mark_read(&self, sender_id: Uuid, receiver_id: Uuid, read_at: OffsetDateTime) -> Result<u64> {
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(SyncError::Backend("injected mark_read failure".to_string()));
        }
        let mut updated = Vec::new();
        for mut entry in self.messages.iter_mut() {
            if entry.sender_id == sender_id && entry.is_unread_for(receiver_id) {
                entry.read_at = Some(read_at);
                updated.push(entry.value().clone());
            }
        }
        let count = updated.len() as u64;
        for message in updated {
            self.fan_out(ChangeEvent::Updated(message));
        }
        Ok(count)
    }

    fn subscribe(&self) -> ChangeFeed {
        ChangeFeed::new(self.feed_tx.subscribe())
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn get(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.profiles.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self
            .profiles
            .iter()
            .filter(|entry| entry.role == role)
            .map(|entry| entry.value().clone())
            .collect();
        profiles.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.id.cmp(&b.id)));
        Ok(profiles)
    }
}

#[async_trait]
impl NotificationSink for MemoryBackend {
    async fn deliver(&self, notification: NotificationDraft) -> Result<()> {
        if self.fail_deliver.load(Ordering::SeqCst) {
            return Err(SyncError::Backend("injected deliver failure".to_string()));
        }
        self.notifications.lock().await.push(notification);
        Ok(())
    }
}
