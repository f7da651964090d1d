pub mod conversation;
pub mod message;
pub mod notification;
pub mod profile;

pub use conversation::Conversation;
pub use message::{Message, MessageDraft};
pub use notification::{NotificationCategory, NotificationDraft};
pub use profile::{Profile, Role};
