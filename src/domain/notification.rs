use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a notification-center record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Message,
    Task,
    Attendance,
    General,
}

impl NotificationCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Task => "task",
            Self::Attendance => "attendance",
            Self::General => "general",
        }
    }
}

/// Fire-and-forget record for the notification center consumed by the
/// hosting application. Delivery failures are logged, never surfaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub recipient_id: Uuid,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
}
