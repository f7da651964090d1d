use crate::config::MessagingConfig;
use crate::domain::conversation::sort_for_display;
use crate::domain::{
    Conversation, Message, MessageDraft, NotificationCategory, NotificationDraft, Profile, Role,
};
use crate::error::{Result, SyncError};
use crate::storage::{ChangeEvent, MessageStore, NotificationSink, ProfileStore};
use opentelemetry::{
    KeyValue, global,
    metrics::Counter,
};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sends_total: Counter<u64>,
    reconciliations_total: Counter<u64>,
    feed_events_total: Counter<u64>,
    notices_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("internlink-sync");
        Self {
            sends_total: meter
                .u64_counter("internlink_messages_sent_total")
                .with_description("Total message send attempts")
                .build(),
            reconciliations_total: meter
                .u64_counter("internlink_conversation_reconciliations_total")
                .with_description("Total conversation list recomputations")
                .build(),
            feed_events_total: meter
                .u64_counter("internlink_feed_events_total")
                .with_description("Change-feed events applied to the view model")
                .build(),
            notices_total: meter
                .u64_counter("internlink_notices_total")
                .with_description("Non-fatal notices surfaced to the user")
                .build(),
        }
    }
}

/// Non-fatal, user-dismissible problem report. Notices never abort an
/// operation; the affected data stays stale until the next reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A single conversation could not be assembled and was omitted from
    /// the list.
    ConversationSkipped { other_id: Uuid, reason: String },
    /// History was fetched but the batch read-marking failed; unread counts
    /// may be stale.
    ReadMarkingFailed { other_id: Uuid, reason: String },
    /// A conversation list recomputation failed outright.
    RefreshFailed { reason: String },
    /// The open conversation's history could not be re-fetched after a
    /// read-state change.
    HistoryRefreshFailed { other_id: Uuid, reason: String },
}

impl Notice {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConversationSkipped { .. } => "conversation_skipped",
            Self::ReadMarkingFailed { .. } => "read_marking_failed",
            Self::RefreshFailed { .. } => "refresh_failed",
            Self::HistoryRefreshFailed { .. } => "history_refresh_failed",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConversationSkipped { reason, .. } => {
                write!(f, "A conversation could not be loaded: {reason}")
            }
            Self::ReadMarkingFailed { reason, .. } => {
                write!(f, "Messages could not be marked as read: {reason}")
            }
            Self::RefreshFailed { reason } => {
                write!(f, "The conversation list could not be refreshed: {reason}")
            }
            Self::HistoryRefreshFailed { reason, .. } => {
                write!(f, "The conversation could not be refreshed: {reason}")
            }
        }
    }
}

#[derive(Debug)]
struct OpenConversation {
    other_id: Uuid,
    messages: Vec<Message>,
}

/// Maintains one user's live view of direct-message conversations.
///
/// The view model (conversation list and open history) is owned exclusively
/// by the synchronizer and exposed read-only. All operations take
/// `&mut self`, so user actions and feed handling cannot interleave; the
/// correctness story is idempotent recomputation from authoritative data,
/// not locking. No operation retries automatically.
pub struct ConversationSynchronizer {
    self_id: Uuid,
    counterpart_role: Role,
    messages: Arc<dyn MessageStore>,
    profiles: Arc<dyn ProfileStore>,
    notifier: Arc<dyn NotificationSink>,
    config: MessagingConfig,
    conversations: Vec<Conversation>,
    open: Option<OpenConversation>,
    notices: Vec<Notice>,
    metrics: Metrics,
}

impl fmt::Debug for ConversationSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationSynchronizer")
            .field("self_id", &self.self_id)
            .field("counterpart_role", &self.counterpart_role)
            .field("conversations", &self.conversations.len())
            .field("open", &self.open.as_ref().map(|o| o.other_id))
            .finish_non_exhaustive()
    }
}

impl ConversationSynchronizer {
    #[must_use]
    pub fn new(
        self_profile: &Profile,
        messages: Arc<dyn MessageStore>,
        profiles: Arc<dyn ProfileStore>,
        notifier: Arc<dyn NotificationSink>,
        config: MessagingConfig,
    ) -> Self {
        Self {
            self_id: self_profile.id,
            counterpart_role: self_profile.role.counterpart(),
            messages,
            profiles,
            notifier,
            config,
            conversations: Vec::new(),
            open: None,
            notices: Vec::new(),
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    #[must_use]
    pub fn conversation(&self, other_id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.other.id == other_id)
    }

    #[must_use]
    pub fn open_with(&self) -> Option<Uuid> {
        self.open.as_ref().map(|open| open.other_id)
    }

    #[must_use]
    pub fn open_messages(&self) -> Option<&[Message]> {
        self.open.as_ref().map(|open| open.messages.as_slice())
    }

    /// Takes the accumulated notices for display as dismissible notices.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Recomputes the conversation list from authoritative data.
    ///
    /// One conversation per counterpart-role profile: latest message plus
    /// unread count. A fetch failure for a single profile omits that
    /// conversation and surfaces a notice without aborting the rest; only a
    /// failure to list the profiles themselves is a hard error. Idempotent:
    /// absent new writes, repeated calls produce the same ordered list.
    #[tracing::instrument(skip(self), fields(user_id = %self.self_id))]
    pub async fn load_conversations(&mut self) -> Result<()> {
        let profiles = self.profiles.list_by_role(self.counterpart_role).await?;

        let mut next = Vec::with_capacity(profiles.len());
        for profile in profiles {
            if profile.id == self.self_id {
                continue;
            }
            let other_id = profile.id;
            match self.assemble_conversation(profile).await {
                Ok(conversation) => next.push(conversation),
                Err(e) => {
                    self.push_notice(Notice::ConversationSkipped { other_id, reason: e.to_string() });
                }
            }
        }

        sort_for_display(&mut next);
        self.conversations = next;
        self.metrics.reconciliations_total.add(1, &[]);
        Ok(())
    }

    async fn assemble_conversation(&self, other: Profile) -> Result<Conversation> {
        let last_message = self.messages.latest_between(self.self_id, other.id).await?;
        let unread = self.messages.unread_count(other.id, self.self_id).await?;
        Ok(Conversation { other, last_message, unread })
    }

    /// Opens the conversation with `other_id`: installs the full ascending
    /// history as the open view, then marks the counterpart's unread
    /// messages as read in one batch.
    ///
    /// A history fetch failure is a hard error and leaves all state
    /// untouched. A read-marking failure keeps the fetched history on
    /// display and surfaces a notice; unread counts stay stale until the
    /// next reconciliation. On success the conversation's unread count is
    /// zero when this returns.
    #[tracing::instrument(skip(self), fields(user_id = %self.self_id, other_id = %other_id))]
    pub async fn open_conversation(&mut self, other_id: Uuid) -> Result<()> {
        if other_id == self.self_id {
            return Err(SyncError::SelfAddressed);
        }
        if self.profiles.get(other_id).await?.is_none() {
            return Err(SyncError::UnknownProfile(other_id));
        }

        let history = self.messages.history_between(self.self_id, other_id).await?;
        self.open = Some(OpenConversation { other_id, messages: history });

        let read_at = OffsetDateTime::now_utc();
        match self.messages.mark_read(other_id, self.self_id, read_at).await {
            Ok(transitioned) => {
                if transitioned > 0 {
                    tracing::debug!(transitioned, "Marked counterpart messages as read");
                }
                if let Some(open) = &mut self.open {
                    for message in &mut open.messages {
                        if message.sender_id == other_id && message.read_at.is_none() {
                            message.read_at = Some(read_at);
                        }
                    }
                }
                self.refresh_conversations_soft().await;
            }
            Err(e) => {
                self.push_notice(Notice::ReadMarkingFailed { other_id, reason: e.to_string() });
            }
        }

        Ok(())
    }

    /// Drops the open view. Late-arriving refreshes for the closed
    /// conversation are discarded when they land.
    pub fn close_conversation(&mut self) {
        self.open = None;
    }

    /// Validates and persists a message to `other_id`, then fires a
    /// notification record at the receiver.
    ///
    /// Empty or whitespace-only content is rejected before any backend
    /// call. Local view state is deliberately left untouched: the change
    /// feed echoes the insert back, deduplicated by id, so the message
    /// appears exactly once regardless of how send acknowledgment and feed
    /// delivery are ordered.
    #[tracing::instrument(skip(self, content), fields(user_id = %self.self_id, receiver_id = %other_id))]
    pub async fn send_message(&mut self, other_id: Uuid, content: &str) -> Result<()> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SyncError::EmptyContent);
        }
        if content.chars().count() > self.config.max_content_len {
            return Err(SyncError::ContentTooLong { max: self.config.max_content_len });
        }
        if other_id == self.self_id {
            return Err(SyncError::SelfAddressed);
        }
        if self.profiles.get(other_id).await?.is_none() {
            return Err(SyncError::UnknownProfile(other_id));
        }

        let draft = MessageDraft {
            sender_id: self.self_id,
            receiver_id: other_id,
            content: content.to_string(),
        };
        match self.messages.insert(draft).await {
            Ok(_) => {
                self.metrics.sends_total.add(1, &[KeyValue::new("status", "success")]);
            }
            Err(e) => {
                self.metrics.sends_total.add(1, &[KeyValue::new("status", "failure")]);
                return Err(e);
            }
        }

        let notification = NotificationDraft {
            recipient_id: other_id,
            title: "New message".to_string(),
            body: preview(content, self.config.notification_preview_len),
            category: NotificationCategory::Message,
        };
        if let Err(e) = self.notifier.deliver(notification).await {
            // Fire-and-forget side channel; the message itself is committed.
            tracing::warn!(error = %e, "Notification delivery failed");
        }

        Ok(())
    }

    /// Applies one change-feed event to the view model.
    ///
    /// Inserts append to the open view (id-deduplicated) and trigger a list
    /// reconciliation; read-timestamp updates trigger a reconciliation and,
    /// when the open pair is affected, a history re-fetch that is applied
    /// only if that conversation is still the open one. Failures degrade to
    /// notices; the handler itself never fails.
    #[tracing::instrument(skip(self, event), fields(user_id = %self.self_id))]
    pub async fn handle_event(&mut self, event: ChangeEvent) {
        if !event.message().involves(self.self_id) {
            return;
        }

        match event {
            ChangeEvent::Inserted(message) => {
                self.metrics.feed_events_total.add(1, &[KeyValue::new("kind", "insert")]);
                if let Some(open) = &mut self.open {
                    if message.is_between(self.self_id, open.other_id)
                        && !open.messages.iter().any(|m| m.id == message.id)
                    {
                        open.messages.push(message);
                        // Feed delivery order is not guaranteed relative to
                        // other fetches; restore the ascending invariant.
                        open.messages
                            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
                    }
                }
                self.refresh_conversations_soft().await;
            }
            ChangeEvent::Updated(message) => {
                self.metrics.feed_events_total.add(1, &[KeyValue::new("kind", "update")]);
                self.refresh_conversations_soft().await;

                let open_other = self.open.as_ref().map(|open| open.other_id);
                if let Some(other_id) = open_other {
                    if message.is_between(self.self_id, other_id) {
                        match self.messages.history_between(self.self_id, other_id).await {
                            Ok(history) => {
                                // The view may have closed while the fetch
                                // was in flight.
                                if let Some(open) = &mut self.open {
                                    if open.other_id == other_id {
                                        open.messages = history;
                                    }
                                }
                            }
                            Err(e) => {
                                self.push_notice(Notice::HistoryRefreshFailed {
                                    other_id,
                                    reason: e.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    async fn refresh_conversations_soft(&mut self) {
        if let Err(e) = self.load_conversations().await {
            let reason = e.to_string();
            self.push_notice(Notice::RefreshFailed { reason });
        }
    }

    fn push_notice(&mut self, notice: Notice) {
        tracing::warn!(kind = notice.kind(), notice = %notice, "Surfacing notice");
        self.metrics.notices_total.add(1, &[KeyValue::new("kind", notice.kind())]);
        self.notices.push(notice);
    }
}

fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let mut body: String = content.chars().take(max_chars).collect();
        body.push('…');
        body
    }
}
