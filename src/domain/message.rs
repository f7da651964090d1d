use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A direct message between two programme participants.
///
/// Immutable once stored, except for `read_at`, which transitions once from
/// unset to set and is never cleared afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
}

impl Message {
    #[must_use]
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    #[must_use]
    pub fn is_between(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender_id == a && self.receiver_id == b) || (self.sender_id == b && self.receiver_id == a)
    }

    /// True if `receiver_id` is the given user and the message has not been
    /// opened yet.
    #[must_use]
    pub fn is_unread_for(&self, receiver_id: Uuid) -> bool {
        self.receiver_id == receiver_id && self.read_at.is_none()
    }
}

/// Payload for a message insert; the store assigns the id and the creation
/// timestamp when it persists the row.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn message(sender: Uuid, receiver: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            content: "hi".to_string(),
            created_at: OffsetDateTime::now_utc(),
            read_at: None,
        }
    }

    #[test]
    fn test_involvement_predicates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let msg = message(a, b);

        assert!(msg.involves(a));
        assert!(msg.involves(b));
        assert!(!msg.involves(c));

        assert!(msg.is_between(a, b));
        assert!(msg.is_between(b, a));
        assert!(!msg.is_between(a, c));
    }

    #[test]
    fn test_unread_is_receiver_scoped() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut msg = message(a, b);

        assert!(msg.is_unread_for(b));
        assert!(!msg.is_unread_for(a));

        msg.read_at = Some(OffsetDateTime::now_utc());
        assert!(!msg.is_unread_for(b));
    }
}
