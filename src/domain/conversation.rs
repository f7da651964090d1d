use crate::domain::message::Message;
use crate::domain::profile::Profile;
use std::cmp::Ordering;

/// Derived view of a direct-message thread with one counterpart.
///
/// Never persisted; rebuilt wholesale from profiles and messages on every
/// reconciliation so counts and ordering cannot drift.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub other: Profile,
    pub last_message: Option<Message>,
    pub unread: u64,
}

impl Conversation {
    /// List order: most recent message first, message-less conversations
    /// last. Ties fall back to display name and id so repeated
    /// reconciliation of unchanged data yields the same sequence.
    #[must_use]
    pub fn display_order(&self, other: &Self) -> Ordering {
        let by_recency = match (&self.last_message, &other.last_message) {
            (Some(a), Some(b)) => b.created_at.cmp(&a.created_at),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_recency
            .then_with(|| self.other.display_name.cmp(&other.other.display_name))
            .then_with(|| self.other.id.cmp(&other.other.id))
    }
}

/// Sorts a freshly assembled conversation list into display order.
pub fn sort_for_display(conversations: &mut [Conversation]) {
    conversations.sort_by(Conversation::display_order);
}
